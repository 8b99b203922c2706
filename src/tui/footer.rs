use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::app::{AppState, NARROW_WIDTH_THRESHOLD};
use crate::engine::SyncEngine;
use crate::input::InputMode;

fn hints(mode: InputMode, narrow: bool) -> &'static [(&'static str, &'static str)] {
    match mode {
        InputMode::Prompt => &[("Enter", "save"), ("Esc", "cancel")],
        InputMode::Confirm => &[("y", "confirm"), ("n", "cancel")],
        InputMode::Normal if narrow => &[
            ("j/k", "nav"),
            ("n", "new"),
            ("s/x", "start/stop"),
            ("d", "del"),
            ("q", "quit"),
        ],
        InputMode::Normal => &[
            ("↑↓/jk", "navigate"),
            ("n", "new"),
            ("t", "rename"),
            ("p", "profile"),
            ("s/S", "start"),
            ("x", "stop"),
            ("d", "delete"),
            ("J/K", "scroll"),
            ("G", "follow"),
            ("r", "refresh"),
            ("q", "quit"),
        ],
    }
}

pub fn render(f: &mut Frame, area: Rect, state: &AppState, engine: &SyncEngine) {
    let narrow = area.width < NARROW_WIDTH_THRESHOLD;
    let mode = state.input_mode();

    // Newest transition notice wins over key hints, except while typing.
    let notice = engine.latest_notification().filter(|_| mode == InputMode::Normal);
    let line = if let Some(message) = notice {
        Line::from(vec![
            Span::styled("★ ", Style::default().fg(Color::Yellow)),
            Span::styled(message.to_string(), Style::default().fg(Color::Yellow)),
        ])
    } else {
        let mut spans: Vec<Span> = Vec::new();
        for (i, (key, desc)) in hints(mode, narrow).iter().enumerate() {
            if i > 0 {
                spans.push(Span::raw(" "));
            }
            spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
            spans.push(Span::styled(format!(" {desc}"), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    };

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_hints_are_shorter() {
        assert!(hints(InputMode::Normal, true).len() < hints(InputMode::Normal, false).len());
    }

    #[test]
    fn prompt_hints_describe_editing() {
        assert_eq!(hints(InputMode::Prompt, false)[0], ("Enter", "save"));
    }
}
