//! The job collection and its single state-transition function.
//!
//! `JobStore::apply` is the only code path that mutates job state. It never
//! fails; callers validate actions before dispatch.

use crate::model::{Job, JobId, LogEntry};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Authoritative replacement of the whole collection. Temporary jobs held
    /// locally survive, since the server cannot know them yet.
    Snapshot(Vec<Job>),
    /// Insert or fully replace one job, merging its logs with what we hold.
    Upsert(Job),
    /// Fallback poll result: upsert each, never delete.
    UpsertAll(Vec<Job>),
    Delete(JobId),
    Log { job_id: JobId, entry: LogEntry },
    LogBatch { job_id: JobId, entries: Vec<LogEntry> },
    /// Swap a temporary job for its server-confirmed counterpart in place.
    Replace { temp_id: JobId, job: Job },
    /// Put a job back at its former position (rolled-back delete).
    Restore { job: Job, position: usize },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::Upsert(_) => "upsert",
            Self::UpsertAll(_) => "upsert_all",
            Self::Delete(_) => "delete",
            Self::Log { .. } => "log",
            Self::LogBatch { .. } => "log_batch",
            Self::Replace { .. } => "replace",
            Self::Restore { .. } => "restore",
        }
    }
}

/// Map from id to job plus an explicit display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
    order: Vec<JobId>,
}

/// `apply` as a value-to-value function.
pub fn reduce(mut state: JobStore, action: Action) -> JobStore {
    state.apply(action);
    state
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Snapshot(jobs) => self.replace_all(jobs),
            Action::Upsert(job) => self.upsert(job),
            Action::UpsertAll(jobs) => {
                for job in jobs {
                    self.upsert(job);
                }
            }
            Action::Delete(id) => self.remove(&id),
            Action::Log { job_id, entry } => self.append_log(&job_id, entry),
            Action::LogBatch { job_id, entries } => self.merge_logs(&job_id, entries),
            Action::Replace { temp_id, job } => self.replace_temporary(&temp_id, job),
            Action::Restore { job, position } => self.restore(job, position),
        }
        debug_assert!(self.is_consistent(), "job store invariants violated");
    }

    fn replace_all(&mut self, jobs: Vec<Job>) {
        let mut next: HashMap<JobId, Job> = HashMap::with_capacity(jobs.len());
        let mut order = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            job.normalize();
            if !next.contains_key(&job.id) {
                order.push(job.id.clone());
            }
            next.insert(job.id.clone(), job);
        }
        for id in &self.order {
            if id.is_temporary() && !next.contains_key(id) {
                if let Some(job) = self.jobs.remove(id) {
                    order.push(id.clone());
                    next.insert(id.clone(), job);
                }
            }
        }
        self.jobs = next;
        self.order = order;
    }

    fn upsert(&mut self, mut job: Job) {
        job.normalize();
        if let Some(existing) = self.jobs.get_mut(&job.id) {
            existing.absorb(job);
        } else {
            self.order.push(job.id.clone());
            self.jobs.insert(job.id.clone(), job);
        }
    }

    fn remove(&mut self, id: &JobId) {
        if self.jobs.remove(id).is_some() {
            self.order.retain(|o| o != id);
        }
    }

    fn append_log(&mut self, id: &JobId, entry: LogEntry) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        let seq = entry.seq;
        if job.logs.insert(entry) {
            job.log_seq = job.log_seq.max(seq);
            job.refresh_last_message();
        }
    }

    fn merge_logs(&mut self, id: &JobId, entries: Vec<LogEntry>) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if let Some(max) = entries.iter().map(|e| e.seq).max() {
            job.log_seq = job.log_seq.max(max);
        }
        job.logs.merge(entries);
        job.refresh_last_message();
    }

    fn replace_temporary(&mut self, temp_id: &JobId, mut job: Job) {
        job.normalize();
        // A push frame may already have materialised the real job.
        if let Some(mut existing) = self.jobs.remove(&job.id) {
            self.order.retain(|o| o != &job.id);
            existing.absorb(job);
            job = existing;
        }
        self.jobs.remove(temp_id);
        match self.order.iter().position(|o| o == temp_id) {
            Some(pos) => self.order[pos] = job.id.clone(),
            None => self.order.push(job.id.clone()),
        }
        self.jobs.insert(job.id.clone(), job);
    }

    fn restore(&mut self, job: Job, position: usize) {
        if self.jobs.contains_key(&job.id) {
            self.upsert(job);
            return;
        }
        let mut job = job;
        job.normalize();
        let at = position.min(self.order.len());
        self.order.insert(at, job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Jobs in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> + '_ {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    pub fn order(&self) -> &[JobId] {
        &self.order
    }

    pub fn at(&self, index: usize) -> Option<&Job> {
        self.order.get(index).and_then(|id| self.jobs.get(id))
    }

    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }

    pub fn log_seq(&self, id: &JobId) -> Option<u64> {
        self.jobs.get(id).map(|j| j.log_seq)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn temporary_ids(&self) -> impl Iterator<Item = &JobId> + '_ {
        self.order.iter().filter(|id| id.is_temporary())
    }

    /// Order and map agree one-to-one, and every job satisfies its log invariants.
    pub fn is_consistent(&self) -> bool {
        if self.order.len() != self.jobs.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::with_capacity(self.order.len());
        self.order.iter().all(|id| {
            seen.insert(id)
                && self.jobs.get(id).is_some_and(|job| {
                    job.id == *id
                        && job.logs.is_well_formed()
                        && job.logs.max_seq().map_or(true, |max| job.log_seq >= max)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_window::WINDOW_MAX;
    use crate::model::JobStatus;
    use pretty_assertions::assert_eq;

    fn job(id: &str) -> Job {
        Job::new(JobId::from(id), format!("Test {id}"))
    }

    fn entry(seq: u64) -> LogEntry {
        LogEntry::new(seq, format!("line {seq}"))
    }

    fn ids(store: &JobStore) -> Vec<&str> {
        store.order().iter().map(JobId::as_str).collect()
    }

    fn seqs(store: &JobStore, id: &str) -> Vec<u64> {
        store
            .get(&JobId::from(id))
            .map(|j| j.logs.iter().map(|e| e.seq).collect())
            .unwrap_or_default()
    }

    #[test]
    fn snapshot_replaces_everything() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("old")));
        store.apply(Action::Snapshot(vec![job("a"), job("b")]));
        assert_eq!(ids(&store), vec!["a", "b"]);
        assert!(!store.contains(&JobId::from("old")));
    }

    #[test]
    fn snapshot_preserves_temporary_jobs() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("a")));
        store.apply(Action::Upsert(Job::new(JobId::temporary(-1), "pending")));
        store.apply(Action::Snapshot(vec![job("b")]));
        assert_eq!(ids(&store), vec!["b", "temp:-1"]);
    }

    #[test]
    fn snapshot_with_duplicate_ids_keeps_one_slot() {
        let mut store = JobStore::new();
        let mut second = job("a");
        second.title = "second".to_string();
        store.apply(Action::Snapshot(vec![job("a"), second]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&JobId::from("a")).map(|j| j.title.as_str()), Some("second"));
    }

    #[test]
    fn upsert_merges_logs() {
        let mut store = JobStore::new();
        let mut first = job("a");
        first.logs.insert(entry(1));
        first.logs.insert(entry(2));
        store.apply(Action::Upsert(first));

        let mut partial = job("a");
        partial.status = JobStatus::Running;
        partial.logs.insert(entry(3));
        store.apply(Action::Upsert(partial));

        assert_eq!(seqs(&store, "a"), vec![1, 2, 3]);
        let a = store.get(&JobId::from("a")).expect("job a");
        assert_eq!(a.status, JobStatus::Running);
        assert_eq!(a.log_seq, 3);
        assert_eq!(a.last_message.as_deref(), Some("line 3"));
    }

    #[test]
    fn upsert_appends_new_jobs_in_arrival_order() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("b")));
        store.apply(Action::Upsert(job("a")));
        store.apply(Action::Upsert(job("b")));
        assert_eq!(ids(&store), vec!["b", "a"]);
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("a")));
        store.apply(Action::Delete(JobId::from("zzz")));
        assert_eq!(ids(&store), vec!["a"]);
        store.apply(Action::Delete(JobId::from("a")));
        assert!(store.is_empty());
    }

    #[test]
    fn log_is_idempotent_under_redelivery() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("a")));
        for _ in 0..3 {
            store.apply(Action::Log {
                job_id: JobId::from("a"),
                entry: entry(1),
            });
        }
        assert_eq!(seqs(&store, "a"), vec![1]);
        assert_eq!(store.log_seq(&JobId::from("a")), Some(1));
    }

    #[test]
    fn log_for_unknown_job_is_ignored() {
        let mut store = JobStore::new();
        store.apply(Action::Log {
            job_id: JobId::from("ghost"),
            entry: entry(1),
        });
        assert!(store.is_empty());
    }

    #[test]
    fn log_seq_survives_window_truncation() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("a")));
        let total = WINDOW_MAX as u64 + 25;
        store.apply(Action::LogBatch {
            job_id: JobId::from("a"),
            entries: (1..=total).map(entry).collect(),
        });
        let a = store.get(&JobId::from("a")).expect("job a");
        assert_eq!(a.logs.len(), WINDOW_MAX);
        assert_eq!(a.logs.min_seq(), Some(26));
        assert_eq!(a.log_seq, total);

        // An old straggler below the window neither re-enters nor lowers the cursor.
        store.apply(Action::Log {
            job_id: JobId::from("a"),
            entry: entry(3),
        });
        let a = store.get(&JobId::from("a")).expect("job a");
        assert_eq!(a.logs.min_seq(), Some(26));
        assert_eq!(a.log_seq, total);
    }

    #[test]
    fn log_batch_in_any_interleaving_converges() {
        let base = job("a");
        let [e1, e2, e3] = [entry(1), entry(2), entry(3)];
        let id = JobId::from("a");
        let mut one = JobStore::new();
        let mut two = JobStore::new();
        one.apply(Action::Upsert(base.clone()));
        two.apply(Action::Upsert(base));

        one.apply(Action::Log { job_id: id.clone(), entry: e3.clone() });
        one.apply(Action::LogBatch {
            job_id: id.clone(),
            entries: vec![e1.clone(), e2.clone(), e3.clone()],
        });

        two.apply(Action::LogBatch { job_id: id.clone(), entries: vec![e2.clone(), e1] });
        two.apply(Action::Log { job_id: id.clone(), entry: e3.clone() });
        two.apply(Action::LogBatch { job_id: id, entries: vec![e3, e2] });

        assert_eq!(seqs(&one, "a"), vec![1, 2, 3]);
        assert_eq!(one, two);
    }

    #[test]
    fn replace_swaps_in_place() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(job("a")));
        store.apply(Action::Upsert(Job::new(JobId::temporary(-1), "draft")));
        store.apply(Action::Upsert(job("c")));

        store.apply(Action::Replace {
            temp_id: JobId::temporary(-1),
            job: job("t-42"),
        });
        assert_eq!(ids(&store), vec!["a", "t-42", "c"]);
        assert!(store.temporary_ids().next().is_none());
    }

    #[test]
    fn replace_after_push_materialised_real_job_keeps_it_once() {
        let mut store = JobStore::new();
        store.apply(Action::Upsert(Job::new(JobId::temporary(-1), "draft")));
        store.apply(Action::Upsert(job("x")));
        let mut pushed = job("t-42");
        pushed.logs.insert(entry(1));
        store.apply(Action::Upsert(pushed));

        store.apply(Action::Replace {
            temp_id: JobId::temporary(-1),
            job: job("t-42"),
        });
        assert_eq!(ids(&store), vec!["t-42", "x"]);
        assert_eq!(seqs(&store, "t-42"), vec![1]);
    }

    #[test]
    fn restore_reinserts_at_position() {
        let mut store = JobStore::new();
        for id in ["a", "b", "c"] {
            store.apply(Action::Upsert(job(id)));
        }
        let b = store.get(&JobId::from("b")).cloned().expect("job b");
        store.apply(Action::Delete(JobId::from("b")));
        store.apply(Action::Restore { job: b, position: 1 });
        assert_eq!(ids(&store), vec!["a", "b", "c"]);

        let far = job("z");
        store.apply(Action::Restore { job: far, position: 99 });
        assert_eq!(ids(&store), vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn reduce_is_value_to_value() {
        let store = reduce(JobStore::new(), Action::Upsert(job("a")));
        let store = reduce(store, Action::Delete(JobId::from("a")));
        assert!(store.is_empty());
        assert!(store.is_consistent());
    }
}
