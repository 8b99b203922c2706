use crate::app::{AppState, QUICK_SELECT_MAX};
use crate::engine::SyncEngine;
use crate::model::Job;
use crate::tui::glyphs;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub fn render(f: &mut Frame, area: Rect, state: &AppState, engine: &SyncEngine) {
    let block = Block::default()
        .title(" Tests ")
        .borders(Borders::RIGHT)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner_width = area.width.saturating_sub(1) as usize;

    let store = engine.store();
    if store.is_empty() {
        let para = Paragraph::new("No tests yet. Press n to create one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(para, area);
        return;
    }

    let visible_height = area.height.saturating_sub(1) as usize;
    let scroll_offset = if state.cursor >= visible_height {
        state.cursor - visible_height + 1
    } else {
        0
    };

    let lines: Vec<Line> = store
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_height)
        .map(|(i, job)| {
            let row = Row {
                index: i,
                selected: i == state.cursor,
                busy: engine.is_pending(&job.id),
                spinner_frame: state.spinner_frame,
            };
            render_job_line(job, &row, inner_width)
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

struct Row {
    index: usize,
    selected: bool,
    busy: bool,
    spinner_frame: usize,
}

fn render_job_line(job: &Job, row: &Row, max_width: usize) -> Line<'static> {
    let (icon, icon_color) = glyphs::status(job.status);
    let idx_label = if row.index < QUICK_SELECT_MAX {
        format!("{}", row.index + 1)
    } else {
        " ".to_string()
    };
    let prefix = format!("{idx_label} {icon} ");

    let busy = if job.id.is_temporary() {
        format!(" {} creating", glyphs::spinner(row.spinner_frame))
    } else if job.stop_requested {
        format!(" {} stopping", glyphs::spinner(row.spinner_frame))
    } else if row.busy {
        format!(" {}", glyphs::spinner(row.spinner_frame))
    } else {
        String::new()
    };
    let profile = job
        .profile_id
        .as_deref()
        .map(|p| format!(" [{p}]"))
        .unwrap_or_default();

    let fixed = UnicodeWidthStr::width(prefix.as_str())
        + UnicodeWidthStr::width(busy.as_str())
        + UnicodeWidthStr::width(profile.as_str());
    let title = truncate(job.display_title(), max_width.saturating_sub(fixed));

    let select_style = if row.selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };

    let mut spans = vec![
        Span::styled(prefix, Style::default().fg(icon_color)),
        Span::styled(title.clone(), select_style),
        Span::styled(profile.clone(), Style::default().fg(Color::Blue)),
        Span::styled(busy.clone(), Style::default().fg(Color::Yellow)),
    ];

    // Last message fills whatever width is left.
    if let Some(message) = job.last_message.as_deref() {
        let used = fixed + UnicodeWidthStr::width(title.as_str());
        let room = max_width.saturating_sub(used + 3);
        if room > 4 {
            spans.push(Span::styled(
                format!("  {}", truncate(message, room)),
                Style::default().fg(Color::DarkGray),
            ));
        }
    }

    Line::from(spans)
}

pub(crate) fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for c in s.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            result.push('…');
            break;
        }
        result.push(c);
        width += cw;
    }
    result
}
