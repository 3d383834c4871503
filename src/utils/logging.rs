use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt};

/// Where log lines go
pub enum LogTarget {
    /// Standard error, for one-shot CLI commands
    Stderr,
    /// Append to a file, for the TUI (stderr would corrupt the screen)
    File(PathBuf),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(target: LogTarget) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Stderr => {
            let _ = fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
        LogTarget::File(path) => {
            // No usable log file: stay silent rather than draw over the UI
            if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
        }
    }
}
