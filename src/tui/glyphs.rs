use crate::channel::ConnectionState;
use crate::model::JobStatus;
use ratatui::style::Color;

const BRAILLE_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub fn spinner(idx: usize) -> char {
    BRAILLE_FRAMES[idx % BRAILLE_FRAMES.len()]
}

pub fn status(status: JobStatus) -> (&'static str, Color) {
    match status {
        JobStatus::Idle => ("·", Color::DarkGray),
        JobStatus::Starting => ("◌", Color::Yellow),
        JobStatus::Running => ("⟳", Color::Yellow),
        JobStatus::Completed => ("✓", Color::Green),
        JobStatus::Failed => ("✗", Color::Red),
        JobStatus::Cancelled => ("⊘", Color::Yellow),
    }
}

pub fn connection(state: ConnectionState) -> (&'static str, Color) {
    match state {
        ConnectionState::Connecting => ("◌", Color::Yellow),
        ConnectionState::Connected => ("●", Color::Green),
        ConnectionState::Disconnected => ("○", Color::Red),
    }
}
