use crate::model::{JobId, JobStatus};
use crate::reducer::JobStore;
use std::collections::HashMap;

/// A server-visible status change worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub job_id: JobId,
    pub title: String,
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Transition {
    pub fn message(&self) -> String {
        match self.to {
            JobStatus::Running => format!("{} is running", self.title),
            JobStatus::Completed => format!("{} completed", self.title),
            JobStatus::Failed => format!("{} failed", self.title),
            JobStatus::Cancelled => format!("{} was cancelled", self.title),
            other => format!("{} changed to {other}", self.title),
        }
    }
}

fn is_reportable(status: JobStatus) -> bool {
    status == JobStatus::Running || status.is_terminal()
}

/// Last seen status per job, compared against the store after every applied action.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    seen: HashMap<JobId, JobStatus>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report status changes since the previous call. Jobs seen for the first
    /// time and temporary jobs never produce a transition.
    pub fn observe(&mut self, store: &JobStore) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for job in store.iter().filter(|j| !j.id.is_temporary()) {
            if let Some(&previous) = self.seen.get(&job.id) {
                if previous != job.status && is_reportable(job.status) {
                    transitions.push(Transition {
                        job_id: job.id.clone(),
                        title: job.display_title().to_string(),
                        from: previous,
                        to: job.status,
                    });
                }
            }
        }

        // Deleted jobs are forgotten; a re-created id counts as first sight.
        self.seen = store
            .iter()
            .filter(|j| !j.id.is_temporary())
            .map(|j| (j.id.clone(), j.status))
            .collect();
        transitions
    }
}
