//! Plain-text result printing for the non-interactive CLI

use crate::scan::ResultEntry;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Print search results, one path per line.
///
/// Directories get a trailing `/`. Content matches are listed under their file
/// as `line:text`, ripgrep heading style.
pub fn print_results(entries: &[ResultEntry], color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    write_results(&mut stdout, entries)
}

pub fn write_results<W: WriteColor>(out: &mut W, entries: &[ResultEntry]) -> io::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if !entry.matches.is_empty() && i > 0 {
            // Blank line between file groups
            writeln!(out)?;
        }

        let color = if entry.is_dir { Color::Blue } else { Color::Magenta };
        out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(!entry.matches.is_empty()))?;
        write!(out, "{}", entry.path.display())?;
        if entry.is_dir {
            write!(out, "/")?;
        }
        out.reset()?;
        writeln!(out)?;

        for m in &entry.matches {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{}", m.line_number)?;
            out.reset()?;
            writeln!(out, ":{}", m.text)?;
        }
    }

    Ok(())
}

/// Print a `key: value` pair with the key highlighted
pub fn print_field(key: &str, value: impl std::fmt::Display) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
    write!(stdout, "{}", key)?;
    stdout.reset()?;
    writeln!(stdout, ": {}", value)
}
