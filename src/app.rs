//! Console state: selection, prompts and the log pane's scroll position.
//!
//! Nothing here touches job state. Prompt and confirmation flows end in a
//! [`Mutation`] that the caller hands to the engine.

use crate::coordinator::Mutation;
use crate::input::InputMode;
use crate::model::{Job, JobId};
use crate::reducer::JobStore;

pub const SPINNER_FRAME_COUNT: usize = 10;
pub const QUICK_SELECT_MAX: usize = 9;
pub const NARROW_WIDTH_THRESHOLD: u16 = 70;
pub const PROMPT_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPurpose {
    Create,
    Rename(JobId),
    Reassign(JobId),
    StartWithProfile(JobId),
}

impl PromptPurpose {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Create => "New test title",
            Self::Rename(_) => "Rename test",
            Self::Reassign(_) => "Profile id",
            Self::StartWithProfile(_) => "Start with profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub purpose: PromptPurpose,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmDelete {
    pub job_id: JobId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    Prompt(Prompt),
    Confirm(ConfirmDelete),
}

pub struct AppState {
    pub server: String,
    pub cursor: usize,
    pub overlay: Overlay,

    // Log pane: lines scrolled up from the newest entry, or following the tail.
    pub log_offset: usize,
    pub follow: bool,

    pub spinner_frame: usize,
    pub should_quit: bool,
    pub desktop_notify: bool,
}

impl AppState {
    pub fn new(server: String, desktop_notify: bool) -> Self {
        Self {
            server,
            cursor: 0,
            overlay: Overlay::None,
            log_offset: 0,
            follow: true,
            spinner_frame: 0,
            should_quit: false,
            desktop_notify,
        }
    }

    pub fn input_mode(&self) -> InputMode {
        match self.overlay {
            Overlay::None => InputMode::Normal,
            Overlay::Prompt(_) => InputMode::Prompt,
            Overlay::Confirm(_) => InputMode::Confirm,
        }
    }

    /// Keep the cursor on a row after jobs come and go.
    pub fn clamp_cursor(&mut self, len: usize) {
        if len == 0 {
            self.cursor = 0;
        } else if self.cursor >= len {
            self.cursor = len - 1;
        }
    }

    pub fn move_cursor_up(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.reset_log_scroll();
        }
    }

    pub fn move_cursor_down(&mut self, len: usize) {
        if len > 0 && self.cursor < len - 1 {
            self.cursor += 1;
            self.reset_log_scroll();
        }
    }

    /// Select the nth job (1-indexed).
    pub fn quick_select(&mut self, n: usize, len: usize) {
        if (1..=QUICK_SELECT_MAX).contains(&n) && n <= len {
            self.cursor = n - 1;
            self.reset_log_scroll();
        }
    }

    pub fn selected<'a>(&self, store: &'a JobStore) -> Option<&'a Job> {
        store.at(self.cursor)
    }

    fn selected_id(&self, store: &JobStore) -> Option<JobId> {
        self.selected(store).map(|j| j.id.clone())
    }

    // --- Prompts ---

    pub fn open_create(&mut self) {
        self.open_prompt(PromptPurpose::Create, String::new());
    }

    pub fn open_rename(&mut self, store: &JobStore) {
        if let Some(job) = self.selected(store) {
            let (id, title) = (job.id.clone(), job.title.clone());
            self.open_prompt(PromptPurpose::Rename(id), title);
        }
    }

    pub fn open_reassign(&mut self, store: &JobStore) {
        if let Some(job) = self.selected(store) {
            let (id, profile) = (job.id.clone(), job.profile_id.clone().unwrap_or_default());
            self.open_prompt(PromptPurpose::Reassign(id), profile);
        }
    }

    pub fn open_start_with_profile(&mut self, store: &JobStore) {
        if let Some(job) = self.selected(store) {
            let (id, profile) = (job.id.clone(), job.profile_id.clone().unwrap_or_default());
            self.open_prompt(PromptPurpose::StartWithProfile(id), profile);
        }
    }

    fn open_prompt(&mut self, purpose: PromptPurpose, input: String) {
        self.overlay = Overlay::Prompt(Prompt { purpose, input });
    }

    pub fn prompt_push(&mut self, c: char) {
        if let Overlay::Prompt(prompt) = &mut self.overlay {
            if !c.is_control() && prompt.input.chars().count() < PROMPT_MAX_CHARS {
                prompt.input.push(c);
            }
        }
    }

    pub fn prompt_backspace(&mut self) {
        if let Overlay::Prompt(prompt) = &mut self.overlay {
            prompt.input.pop();
        }
    }

    /// Close the prompt and turn its input into a mutation. Blank input only
    /// makes sense for a create; anywhere else it just closes the prompt.
    pub fn submit_prompt(&mut self) -> Option<Mutation> {
        let Overlay::Prompt(prompt) = std::mem::take(&mut self.overlay) else {
            return None;
        };
        let input = prompt.input.trim().to_string();
        match prompt.purpose {
            PromptPurpose::Create => Some(Mutation::Create {
                title: input,
                profile_id: None,
            }),
            _ if input.is_empty() => None,
            PromptPurpose::Rename(job_id) => Some(Mutation::Rename { job_id, title: input }),
            PromptPurpose::Reassign(job_id) => Some(Mutation::Reassign {
                job_id,
                profile_id: input,
            }),
            PromptPurpose::StartWithProfile(job_id) => Some(Mutation::Start {
                job_id,
                profile_id: Some(input),
            }),
        }
    }

    // --- Delete confirmation ---

    pub fn open_confirm_delete(&mut self, store: &JobStore) {
        if let Some(job) = self.selected(store) {
            self.overlay = Overlay::Confirm(ConfirmDelete {
                job_id: job.id.clone(),
                message: format!("Delete \"{}\"?", job.display_title()),
            });
        }
    }

    pub fn confirm(&mut self) -> Option<Mutation> {
        match std::mem::take(&mut self.overlay) {
            Overlay::Confirm(confirm) => Some(Mutation::Delete {
                job_id: confirm.job_id,
            }),
            other => {
                self.overlay = other;
                None
            }
        }
    }

    pub fn cancel_overlay(&mut self) {
        self.overlay = Overlay::None;
    }

    // --- Direct mutations on the selection ---

    pub fn start_selected(&self, store: &JobStore) -> Option<Mutation> {
        self.selected_id(store).map(|job_id| Mutation::Start {
            job_id,
            profile_id: None,
        })
    }

    pub fn stop_selected(&self, store: &JobStore) -> Option<Mutation> {
        self.selected_id(store).map(|job_id| Mutation::Stop { job_id })
    }

    // --- Log pane ---

    fn reset_log_scroll(&mut self) {
        self.log_offset = 0;
        self.follow = true;
    }

    pub fn scroll_log_up(&mut self, lines: usize, total: usize, height: usize) {
        let max = total.saturating_sub(height);
        self.log_offset = (self.log_offset + lines).min(max);
        self.follow = self.log_offset == 0;
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_offset = self.log_offset.saturating_sub(lines);
        self.follow = self.log_offset == 0;
    }

    pub fn scroll_log_to_top(&mut self, total: usize, height: usize) {
        self.log_offset = total.saturating_sub(height);
        self.follow = self.log_offset == 0;
    }

    pub fn follow_log(&mut self) {
        self.reset_log_scroll();
    }

    /// Index range of log lines visible in a pane `height` rows tall. In follow
    /// mode this is always the tail; otherwise the offset is held as new lines
    /// arrive, clamped to what the window still retains.
    pub fn log_range(&self, total: usize, height: usize) -> std::ops::Range<usize> {
        let offset = if self.follow {
            0
        } else {
            self.log_offset.min(total.saturating_sub(height))
        };
        let end = total - offset;
        end.saturating_sub(height)..end
    }

    pub fn advance_spinner(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAME_COUNT;
    }
}
