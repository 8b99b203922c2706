use crate::app::AppState;
use crate::engine::SyncEngine;
use crate::model::{Job, LogEntry};
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

pub fn render(f: &mut Frame, area: Rect, state: &AppState, engine: &SyncEngine) {
    let Some(job) = state.selected(engine.store()) else {
        let block = Block::default().title(" Logs ").borders(Borders::NONE);
        f.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let height = body_height(area);
    let total = job.logs.len();
    let range = state.log_range(total, height);

    let position = if state.follow {
        " following".to_string()
    } else {
        format!(" [{}-{}/{}]", range.start + 1, range.end, total)
    };
    let backfill = if engine.is_backfilling(&job.id) {
        " (backfilling)"
    } else {
        ""
    };
    let title = format!(" Logs: {}{}{} ", job.display_title(), position, backfill);

    let block = Block::default()
        .title(title)
        .title_bottom(Line::from(run_summary(job)).right_aligned())
        .borders(Borders::NONE);

    let lines: Vec<Line> = job.logs.as_slice()[range].iter().map(render_entry).collect();
    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Rows available for log lines once the title and summary rows are taken.
pub fn body_height(area: Rect) -> usize {
    area.height.saturating_sub(2) as usize
}

fn render_entry(entry: &LogEntry) -> Line<'static> {
    let mut spans = vec![
        Span::styled(format!("{:>5} ", entry.seq), Style::default().fg(Color::DarkGray)),
        Span::styled(
            entry.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(iface) = &entry.interface {
        spans.push(Span::styled(format!("[{iface}] "), Style::default().fg(Color::Blue)));
    }
    spans.push(Span::raw(entry.message.clone()));
    Line::from(spans)
}

fn run_summary(job: &Job) -> String {
    let Some(run) = &job.run else {
        return String::new();
    };
    let mut parts = vec![format!("run {}", run.id)];
    if let Some(profile) = &run.profile_id {
        parts.push(format!("profile {profile}"));
    }
    if let Some(code) = run.exit_code {
        parts.push(format!("exit {code}"));
    }
    if let Some(error) = &run.error {
        parts.push(error.clone());
    }
    format!(" {} ", parts.join(" · "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, Run};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn entry_line_includes_interface() {
        let mut entry = LogEntry::new(42, "SYN seen");
        entry.interface = Some("eth1".into());
        let text: String = render_entry(&entry).spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.starts_with("   42 "));
        assert!(text.ends_with("[eth1] SYN seen"));
    }

    #[test]
    fn summary_lists_run_details() {
        let mut job = Job::new(JobId::from("a"), "t");
        assert_eq!(run_summary(&job), "");
        job.run = Some(Run {
            id: "r1".into(),
            profile_id: Some("p".into()),
            started_at: Utc::now(),
            finished_at: None,
            exit_code: Some(2),
            exit_codes: None,
            cancelled: false,
            error: None,
            interfaces: None,
        });
        assert_eq!(run_summary(&job), " run r1 · profile p · exit 2 ");
    }

    #[test]
    fn body_height_leaves_room_for_title() {
        assert_eq!(body_height(Rect::new(0, 0, 10, 12)), 10);
        assert_eq!(body_height(Rect::new(0, 0, 10, 1)), 0);
    }
}
