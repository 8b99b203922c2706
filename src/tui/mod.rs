pub mod footer;
pub mod glyphs;
pub mod header;
pub mod jobs;
pub mod logs;
pub mod prompt;

use crate::app::{AppState, Overlay, NARROW_WIDTH_THRESHOLD};
use crate::engine::SyncEngine;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

pub struct Panes {
    pub header: Rect,
    pub jobs: Rect,
    pub logs: Rect,
    pub footer: Rect,
}

/// Split the screen. Narrow terminals stack the log pane under the job list.
pub fn layout(area: Rect) -> Panes {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(1),    // body
            Constraint::Length(2), // footer
        ])
        .split(area);

    let body = if area.width < NARROW_WIDTH_THRESHOLD {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(rows[1])
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(rows[1])
    };

    Panes {
        header: rows[0],
        jobs: body[0],
        logs: body[1],
        footer: rows[2],
    }
}

pub fn render(f: &mut Frame, state: &AppState, engine: &SyncEngine) {
    let panes = layout(f.area());

    header::render(f, panes.header, state, engine);
    jobs::render(f, panes.jobs, state, engine);
    logs::render(f, panes.logs, state, engine);
    footer::render(f, panes.footer, state, engine);

    // Error box above the footer
    if let Some(err) = engine.latest_error() {
        let area = f.area();
        if area.height > 6 && area.width >= 4 {
            let err_area = Rect {
                x: area.x + 1,
                y: area.y + area.height.saturating_sub(5),
                width: area.width.saturating_sub(2),
                height: 3,
            };
            let count = engine.errors().len();
            let title = if count > 1 {
                format!(" Error (1 of {count}, Esc to dismiss) ")
            } else {
                " Error (Esc to dismiss) ".to_string()
            };
            let err_widget = Paragraph::new(err.to_owned())
                .style(Style::default().fg(Color::Red))
                .block(
                    Block::default()
                        .title(title)
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Red)),
                )
                .wrap(Wrap { trim: true });
            f.render_widget(err_widget, err_area);
        }
    }

    match &state.overlay {
        Overlay::Prompt(p) => prompt::render_prompt(f, p),
        Overlay::Confirm(c) => prompt::render_confirm(f, c),
        Overlay::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_layout_is_side_by_side() {
        let p = layout(Rect::new(0, 0, 120, 40));
        assert_eq!(p.jobs.y, p.logs.y);
        assert!(p.logs.x > p.jobs.x);
        assert_eq!(p.header.height, 2);
        assert_eq!(p.footer.y, 38);
    }

    #[test]
    fn narrow_layout_stacks() {
        let p = layout(Rect::new(0, 0, 50, 40));
        assert_eq!(p.jobs.x, p.logs.x);
        assert!(p.logs.y > p.jobs.y);
    }
}
