//! Rendering for the TUI.

use super::app::{App, Focus};
use super::event::HELP_LINES;
use super::theme::Theme;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Widget},
    Frame,
};
use shelf_view::Screen;

pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let theme = &app.theme;

    Clear.render(area, frame.buffer_mut());
    Block::default()
        .style(Style::default().bg(theme.bg))
        .render(area, frame.buffer_mut());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(frame, app, chunks[0]);
    match app.screen() {
        Screen::Loading => render_centered(
            frame,
            chunks[1],
            theme,
            vec![Line::from(Span::styled(
                format!("{} Checking your session", app.spinner()),
                Style::default().fg(theme.text_muted),
            ))],
        ),
        Screen::SignIn => render_sign_in(frame, app, chunks[1]),
        Screen::Shelf => render_shelf(frame, app, chunks[1]),
    }
    render_status_bar(frame, app, chunks[2]);

    if app.show_help {
        render_help(frame, theme);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let mut spans = vec![Span::styled(
        " Linkshelf ",
        Style::default()
            .fg(theme.accent)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(greeting) = app.state.greeting() {
        spans.push(Span::styled(
            greeting,
            Style::default().fg(theme.text_secondary),
        ));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.bg)),
        area,
    );
}

fn render_centered(frame: &mut Frame, area: Rect, theme: &Theme, lines: Vec<Line<'static>>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.bg_panel));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let height = lines.len() as u16;
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(inner);

    frame.render_widget(
        Paragraph::new(lines).alignment(Alignment::Center),
        vertical[1],
    );
}

fn render_sign_in(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let prompt = if app.signing_in {
        Line::from(Span::styled(
            format!("{} Waiting for the browser...", app.spinner()),
            Style::default().fg(theme.text_muted),
        ))
    } else {
        Line::from(vec![
            Span::styled("Press ", Style::default().fg(theme.text_secondary)),
            Span::styled("s", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
            Span::styled(
                " to sign in with Google",
                Style::default().fg(theme.text_secondary),
            ),
        ])
    };

    let lines = vec![
        Line::from(Span::styled(
            "Your links, on every device",
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        prompt,
    ];
    render_centered(frame, area, theme, lines);
}

fn render_shelf(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(area);

    render_input(frame, app, chunks[0], "Title", &app.title_input, Focus::Title);
    render_input(frame, app, chunks[1], "URL", &app.url_input, Focus::Url);
    render_bookmarks(frame, app, chunks[2]);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect, label: &str, value: &str, field: Focus) {
    let theme = &app.theme;
    let active = app.focus == field;
    let block = panel_block(label, active, theme);
    let inner = block.inner(area);

    let width = inner.width as usize;
    let shown = tail_to_width(value, width.saturating_sub(1));
    frame.render_widget(
        Paragraph::new(Span::styled(shown.clone(), Style::default().fg(theme.text))).block(block),
        area,
    );

    if active {
        let x = inner.x + shown.chars().count() as u16;
        frame.set_cursor_position((x, inner.y));
    }
}

fn render_bookmarks(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let bookmarks = &app.state.bookmarks;
    let block = panel_block(
        &format!("Bookmarks ({})", bookmarks.len()),
        app.focus == Focus::List,
        theme,
    );

    if bookmarks.is_empty() {
        frame.render_widget(
            Paragraph::new(Span::styled(
                "No bookmarks yet. Type a title and URL above, then press Enter.",
                Style::default().fg(theme.text_muted),
            ))
            .block(block),
            area,
        );
        return;
    }

    let width = block.inner(area).width as usize;
    let items: Vec<ListItem> = bookmarks
        .iter()
        .map(|b| {
            let created = b
                .created_at
                .with_timezone(&chrono::Local)
                .format("%b %d %H:%M")
                .to_string();
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(
                        truncate_str(&b.title, width.saturating_sub(created.len() + 2)),
                        Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(created, Style::default().fg(theme.text_muted)),
                ]),
                Line::from(Span::styled(
                    truncate_str(&b.url, width),
                    Style::default().fg(theme.link),
                )),
            ])
        })
        .collect();

    let highlight = if app.focus == Focus::List {
        Style::default().bg(theme.bg_selection)
    } else {
        Style::default()
    };
    let list = List::new(items).block(block).highlight_style(highlight);
    let mut state = ListState::default().with_selected(Some(app.selected));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let theme = &app.theme;
    let (text, color) = match &app.status_message {
        Some(msg) if msg.is_error => (msg.text.clone(), theme.error),
        Some(msg) => (msg.text.clone(), theme.success),
        None => (default_status(app).to_string(), theme.text_muted),
    };

    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(text, Style::default().fg(color)),
    ]))
    .style(Style::default().bg(theme.bg_panel));
    frame.render_widget(status, area);
}

fn default_status(app: &App) -> &'static str {
    match (app.screen(), app.focus) {
        (Screen::Loading, _) => "q: quit",
        (Screen::SignIn, _) => "s: sign in | ?: help | q: quit",
        (Screen::Shelf, Focus::List) => {
            "Enter: open | d: delete | r: refresh | o: sign out | Tab: editor | ?: help | q: quit"
        }
        (Screen::Shelf, _) => "Enter: add | Tab: next field | Esc: list | Ctrl-C: quit",
    }
}

fn render_help(frame: &mut Frame, theme: &Theme) {
    let area = centered_rect(52, HELP_LINES.len() as u16 + 2, frame.area());
    let lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(
                    format!(" {:<6} ", key),
                    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
                ),
                Span::styled(*what, Style::default().fg(theme.text_secondary)),
            ])
        })
        .collect();

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(panel_block("Keys", true, theme)),
        area,
    );
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

pub fn panel_block<'a>(title: &str, is_active: bool, theme: &Theme) -> Block<'a> {
    let (border_color, title_color) = if is_active {
        (theme.border_active, theme.accent)
    } else {
        (theme.border, theme.text_secondary)
    };

    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", title))
        .title_style(Style::default().fg(title_color))
        .style(Style::default().bg(theme.bg_panel))
}

/// Cut `s` to at most `max_width` characters, marking the cut with "...".
pub fn truncate_str(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width > 3 {
        let kept: String = s.chars().take(max_width - 3).collect();
        format!("{}...", kept)
    } else {
        s.chars().take(max_width).collect()
    }
}

/// The last `max_width` characters, so the cursor end of a long input stays visible.
fn tail_to_width(s: &str, max_width: usize) -> String {
    let len = s.chars().count();
    s.chars().skip(len.saturating_sub(max_width)).collect()
}
