use crate::app::{ConfirmDelete, Prompt};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

pub fn render_prompt(f: &mut Frame, prompt: &Prompt) {
    let area = centered(f.area(), 60, 3);
    f.render_widget(Clear, area);

    let block = Block::default()
        .title(format!(" {} ", prompt.purpose.title()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .style(Style::default().bg(Color::Black));

    // Keep the end of long input visible.
    let room = area.width.saturating_sub(3) as usize;
    let skip = prompt.input.chars().count().saturating_sub(room);
    let visible: String = prompt.input.chars().skip(skip).collect();

    let line = Line::from(vec![
        Span::styled(visible, Style::default().fg(Color::White)),
        Span::styled("▏", Style::default().fg(Color::Cyan)),
    ]);
    f.render_widget(Paragraph::new(line).block(block), area);
}

pub fn render_confirm(f: &mut Frame, confirm: &ConfirmDelete) {
    let area = centered(f.area(), 44, 7);
    f.render_widget(Clear, area);

    let hints = Line::from(vec![
        Span::styled(
            "y",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" delete   ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            "n",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" keep ", Style::default().fg(Color::DarkGray)),
    ]);

    let block = Block::default()
        .title(" Delete test ")
        .title_bottom(hints.centered())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let message = Line::from(Span::styled(
        confirm.message.as_str(),
        Style::default().fg(Color::White),
    ));

    let paragraph = Paragraph::new(vec![Line::from(""), message, Line::from("")])
        .block(block)
        .centered();
    f.render_widget(paragraph, area);
}
