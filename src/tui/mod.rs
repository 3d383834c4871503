mod app;
mod ui;

use crate::instance::InstanceListener;
use crate::server::{get_socket_path, spawn_bookmark_sync};
use crate::utils::AppConfig;
use anyhow::Result;
use app::App;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::{info, warn};

/// Event poll interval; also bounds debounce and toggle latency
const EVENT_POLL: Duration = Duration::from_millis(25);

pub fn run(config: AppConfig, initial_query: Option<String>, mut instance: InstanceListener) -> Result<()> {
    // Register bookmarks in the background; the handle is intentionally dropped
    if let Err(e) = spawn_bookmark_sync(get_socket_path(), config.bookmarks.clone()) {
        warn!(error = %e, "failed to start bookmark sync");
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut app = App::new(config);
    app.set_query(initial_query.as_deref().unwrap_or(""));

    // Main loop
    let result = run_app(&mut terminal, &mut app, &mut instance);
    app.shutdown();

    // Restore terminal
    disable_raw_mode()?;
    if app.visible {
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    }
    terminal.show_cursor()?;

    result
}

fn set_visible(terminal: &mut Terminal<CrosstermBackend<Stdout>>, visible: bool) -> Result<()> {
    if visible {
        execute!(terminal.backend_mut(), EnterAlternateScreen)?;
        terminal.clear()?;
    } else {
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    instance: &mut InstanceListener,
) -> Result<()> {
    loop {
        // Each toggle flips visibility
        for _ in 0..instance.poll_toggle() {
            app.toggle_visibility();
            info!(visible = app.visible, "toggled by another instance");
            set_visible(terminal, app.visible)?;
        }

        app.tick();

        if app.visible {
            terminal.draw(|f| ui::draw(f, app))?;
        }

        if !event::poll(EVENT_POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // Global keybindings
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Ok(()),
            (KeyModifiers::CONTROL, KeyCode::Char('q')) => return Ok(()),
            _ => {}
        }

        if !app.visible {
            continue;
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('g')) => app.toggle_content_mode(),
            (KeyModifiers::CONTROL, KeyCode::Char('t')) => app.cycle_kind(),
            (KeyModifiers::CONTROL, KeyCode::Char('b')) => app.cycle_bookmark(),
            (KeyModifiers::CONTROL, KeyCode::Char('j'))
            | (KeyModifiers::CONTROL, KeyCode::Char('n')) => app.select_next(),
            (KeyModifiers::CONTROL, KeyCode::Char('k'))
            | (KeyModifiers::CONTROL, KeyCode::Char('p')) => app.select_prev(),
            (KeyModifiers::CONTROL, KeyCode::Char('w')) => app.delete_word(),
            (KeyModifiers::CONTROL, KeyCode::Char('u')) => app.clear_query(),
            (KeyModifiers::CONTROL, KeyCode::Char('h')) => app.pop_char(),
            (KeyModifiers::NONE | KeyModifiers::SHIFT, code) => match code {
                KeyCode::Esc => {
                    if app.query.is_empty() {
                        return Ok(());
                    }
                    app.clear_query();
                }
                KeyCode::Enter => {
                    // Opening hides the finder, like closing a launcher window
                    if app.open_selected() {
                        app.toggle_visibility();
                        set_visible(terminal, app.visible)?;
                    }
                }
                KeyCode::Down | KeyCode::Tab => app.select_next(),
                KeyCode::Up | KeyCode::BackTab => app.select_prev(),
                KeyCode::PageDown => app.select_page_down(),
                KeyCode::PageUp => app.select_page_up(),
                KeyCode::Home => app.select_first(),
                KeyCode::End => app.select_last(),
                KeyCode::Char(c) => app.push_char(c),
                KeyCode::Backspace => app.pop_char(),
                _ => {}
            },
            _ => {}
        }
    }
}
