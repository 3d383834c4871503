use crate::scan::{EntryKind, SearchMode};
use crate::tui::app::App;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Query input
            Constraint::Min(5),    // Results
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    draw_query_input(f, app, chunks[0]);
    draw_results_list(f, app, chunks[1]);
    draw_status_bar(f, app, chunks[2]);
}

fn draw_query_input(f: &mut Frame, app: &App, area: Rect) {
    let mode = match app.mode {
        SearchMode::Name => "name",
        SearchMode::Content => "content",
    };
    let kind = match app.kind {
        EntryKind::All => "all",
        EntryKind::Files => "files",
        EntryKind::Dirs => "dirs",
    };

    let input = Paragraph::new(app.query.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(format!(
            " [{}] {} / {} (Ctrl+B scope, Ctrl+G content, Ctrl+T kind, Esc quit) ",
            app.scope_label(),
            mode,
            kind
        )));

    f.render_widget(input, area);

    let width = app.query.chars().count() as u16;
    f.set_cursor_position((area.x + width + 1, area.y + 1));
}

fn draw_results_list(f: &mut Frame, app: &App, area: Rect) {
    let dir_style = Style::default().fg(Color::Blue);
    let file_style = Style::default().fg(Color::White);
    let line_style = Style::default().fg(Color::Yellow);
    let snippet_style = Style::default().fg(Color::DarkGray);

    let items: Vec<ListItem> = app
        .results
        .iter()
        .map(|entry| {
            let style = if entry.is_dir { dir_style } else { file_style };
            let mut lines = vec![Line::from(Span::styled(app.display_path(entry), style))];

            // First match only; the list stays one row per file plus one snippet row
            if let Some(m) = entry.matches.first() {
                lines.push(Line::from(vec![
                    Span::styled(format!("  {:>5}: ", m.line_number), line_style),
                    Span::styled(m.text.clone(), snippet_style),
                ]));
            }

            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Results ({}) ", app.results.len())),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.results.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = Paragraph::new(app.status_message.as_str())
        .style(Style::default().fg(Color::Cyan));

    f.render_widget(status, area);
}
