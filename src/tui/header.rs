use crate::app::AppState;
use crate::channel::ConnectionState;
use crate::engine::SyncEngine;
use crate::tui::glyphs;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn render(f: &mut Frame, area: Rect, state: &AppState, engine: &SyncEngine) {
    let connection = engine.connection();
    let (dot, dot_color) = glyphs::connection(connection);

    let mut spans = vec![
        Span::styled(
            format!(" tabsync v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("│ "),
        Span::styled(
            state.server.as_str(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(format!("{dot} {}", connection.label()), Style::default().fg(dot_color)),
    ];

    if connection == ConnectionState::Disconnected {
        spans.push(Span::styled(" [polling]", Style::default().fg(Color::Magenta)));
    }

    let count = engine.store().len();
    spans.push(Span::styled(
        format!(" │ {count} test{}", if count == 1 { "" } else { "s" }),
        Style::default().fg(Color::DarkGray),
    ));

    // Busy spinner while anything is in flight, otherwise time since last full sync
    let pending = engine.pending_count();
    if pending > 0 || engine.is_resyncing() || connection == ConnectionState::Connecting {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            glyphs::spinner(state.spinner_frame).to_string(),
            Style::default().fg(Color::Yellow),
        ));
        if pending > 0 {
            spans.push(Span::styled(
                format!(" {pending} pending"),
                Style::default().fg(Color::Yellow),
            ));
        }
    } else if let Some(at) = engine.last_sync() {
        spans.push(Span::styled(
            format!(" synced {}s ago", at.elapsed().as_secs()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if engine.latest_error().is_some() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            "!",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(header, area);
}
