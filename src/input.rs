use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    DismissError,
    MoveUp,
    MoveDown,
    QuickSelect(usize),
    Create,
    Rename,
    Reassign,
    Start,
    StartWithProfile,
    Stop,
    Delete,
    Refresh,
    ScrollLogUp,
    ScrollLogDown,
    PageLogUp,
    PageLogDown,
    ScrollLogTop,
    FollowLog,
    InputChar(char),
    InputBackspace,
    Submit,
    Cancel,
    Confirm,
    None,
}

/// What currently owns the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt,
    Confirm,
}

/// Captures the UI state needed to interpret a key press.
#[derive(Debug, Clone, Default)]
pub struct InputContext {
    pub has_error: bool,
    pub mode: InputMode,
}

pub fn map_key(key: KeyEvent, ctx: &InputContext) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    // Ctrl+C always quits
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }

    match ctx.mode {
        InputMode::Prompt => {
            return match key.code {
                KeyCode::Enter => Action::Submit,
                KeyCode::Esc => Action::Cancel,
                KeyCode::Backspace => Action::InputBackspace,
                KeyCode::Char(c) => Action::InputChar(c),
                _ => Action::None,
            };
        }
        InputMode::Confirm => {
            return match key.code {
                KeyCode::Char('y' | 'Y') | KeyCode::Enter => Action::Confirm,
                KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => Action::Cancel,
                _ => Action::None,
            };
        }
        InputMode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Esc => {
            if ctx.has_error {
                Action::DismissError
            } else {
                Action::Quit
            }
        }
        KeyCode::Up | KeyCode::Char('k') => Action::MoveUp,
        KeyCode::Down | KeyCode::Char('j') => Action::MoveDown,
        KeyCode::Char('n' | 'a') => Action::Create,
        KeyCode::Char('t') => Action::Rename,
        KeyCode::Char('p') => Action::Reassign,
        KeyCode::Char('s') => Action::Start,
        KeyCode::Char('S') => Action::StartWithProfile,
        KeyCode::Char('x') => Action::Stop,
        KeyCode::Char('d') | KeyCode::Delete => Action::Delete,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Char('K') => Action::ScrollLogUp,
        KeyCode::Char('J') => Action::ScrollLogDown,
        KeyCode::PageUp => Action::PageLogUp,
        KeyCode::PageDown => Action::PageLogDown,
        KeyCode::Char('g') | KeyCode::Home => Action::ScrollLogTop,
        KeyCode::Char('G') | KeyCode::End => Action::FollowLog,
        KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
            Action::QuickSelect((c as u8 - b'0') as usize)
        }
        _ => Action::None,
    }
}
