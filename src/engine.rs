//! The single writer of job state.
//!
//! [`SyncEngine`] owns the [`JobStore`] and every per-job guard. Background
//! tasks (push channel, fallback poller, backfill fetches, mutation requests,
//! settle pollers) never touch the store; they report through the
//! [`SyncEvent`] queue and the owner of the receiving end feeds each event to
//! [`SyncEngine::handle`] in arrival order.
//!
//! On teardown the engine aborts the tasks it supervises. Requests already in
//! flight are not cancelled; their results land on a closed queue and are
//! discarded.

use crate::api::{JobPatch, JobsApi};
use crate::backfill::BackfillClient;
use crate::channel::{self, ChannelManager, ConnectionState};
use crate::config::SyncConfig;
use crate::coordinator::{Coordinator, Mutation, OpId, Rejection, Response, Ticket};
use crate::diff::{Transition, TransitionTracker};
use crate::events::{spawn_monitored, SyncEvent};
use crate::model::{Job, JobId};
use crate::poller::{FallbackPoller, ResyncGate, SettleGoal, SettlePoller};
use crate::protocol::Frame;
use crate::reducer::{Action, JobStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

/// How long a transition notice stays on screen.
pub const NOTIFICATION_TTL_SECS: u64 = 5;

/// Error notices stay until dismissed or for this long.
pub const ERROR_TTL_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub at: Instant,
}

impl Notice {
    fn now(message: String) -> Self {
        Self {
            message,
            at: Instant::now(),
        }
    }
}

pub struct SyncEngine {
    api: Arc<dyn JobsApi>,
    config: SyncConfig,
    tx: mpsc::UnboundedSender<SyncEvent>,
    store: JobStore,
    connection: ConnectionState,
    coordinator: Coordinator,
    backfill: BackfillClient,
    resync: ResyncGate,
    /// Bumped by every push that can remove jobs. A resync requested under an
    /// older generation may carry jobs the server has since deleted.
    generation: u64,
    tracker: TransitionTracker,
    settles: HashMap<JobId, JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
    errors: Vec<Notice>,
    notifications: Vec<Notice>,
    last_sync: Option<Instant>,
}

impl SyncEngine {
    /// The engine and the receiving end of its event queue. Feed everything
    /// received there back into [`SyncEngine::handle`].
    pub fn new(api: Arc<dyn JobsApi>, config: SyncConfig) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backfill = BackfillClient::new(Arc::clone(&api), config.backfill_retry_delay);
        let engine = Self {
            api,
            config,
            tx,
            store: JobStore::new(),
            connection: ConnectionState::Connecting,
            coordinator: Coordinator::new(),
            backfill,
            resync: ResyncGate::default(),
            generation: 0,
            tracker: TransitionTracker::new(),
            settles: HashMap::new(),
            background: Vec::new(),
            errors: Vec::new(),
            notifications: Vec::new(),
            last_sync: None,
        };
        (engine, rx)
    }

    /// Start the push channel and the fallback poller that shadows it.
    pub fn spawn_background(&mut self, ws_url: Url) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let channel = ChannelManager::new(ws_url, &self.config, self.tx.clone(), state_tx);
        self.background.push(tokio::spawn(channel.run()));
        self.spawn_fallback(state_rx);
    }

    /// Start the fallback poller against a connection state published elsewhere.
    pub fn spawn_fallback(&mut self, state_rx: watch::Receiver<ConnectionState>) {
        let poller = FallbackPoller::new(self.config.fallback_interval, state_rx, self.tx.clone());
        self.background.push(tokio::spawn(poller.run()));
    }

    /// Apply one event. Returns the status transitions it caused.
    pub fn handle(&mut self, event: SyncEvent) -> Vec<Transition> {
        match event {
            SyncEvent::Connection(state) => {
                tracing::info!(state = state.label(), "connection state changed");
                self.connection = state;
            }
            SyncEvent::Frame(frame) => self.on_frame(frame),
            SyncEvent::ResyncDue => {
                self.request_resync();
            }
            SyncEvent::ResyncResult { generation, result } => {
                self.resync.finish();
                match result {
                    Ok(jobs) if generation != self.generation => {
                        tracing::debug!(
                            count = jobs.len(),
                            requested = generation,
                            current = self.generation,
                            "discarding resync overtaken by push"
                        );
                    }
                    Ok(jobs) => {
                        tracing::debug!(count = jobs.len(), "resync applied");
                        self.store.apply(Action::UpsertAll(
                            jobs.into_iter().filter(|j| !j.id.is_temporary()).collect(),
                        ));
                        self.last_sync = Some(Instant::now());
                    }
                    Err(e) => tracing::warn!(error = %e, "resync failed"),
                }
            }
            SyncEvent::BackfillResult { job_id, after, result } => {
                self.backfill.complete(&job_id);
                match result {
                    Ok(page) => {
                        tracing::debug!(%job_id, after_seq = after, count = page.entries.len(), "backfill applied");
                        if !page.entries.is_empty() {
                            self.store.apply(Action::LogBatch {
                                job_id,
                                entries: page.entries,
                            });
                        }
                    }
                    Err(e) => tracing::debug!(%job_id, after_seq = after, error = %e, "backfill dropped"),
                }
            }
            SyncEvent::MutationResult { op_id, result } => {
                if !self.on_mutation_result(op_id, result) {
                    // Rolled back: the restored status is not news.
                    self.tracker.observe(&self.store);
                    return Vec::new();
                }
            }
            SyncEvent::FollowUpResult { job_id, result } => {
                self.coordinator.finish_follow_up(&job_id);
                match result {
                    Ok(job) => {
                        if self.store.contains(&job.id) {
                            self.store.apply(Action::Upsert(job));
                        }
                    }
                    Err(e) => tracing::warn!(%job_id, error = %e, "follow-up update failed"),
                }
            }
            SyncEvent::SettleObserved(job) => {
                if self.store.contains(&job.id) && !self.coordinator.is_pending(&job.id) {
                    self.store.apply(Action::Upsert(job));
                }
            }
        }

        let transitions = self.tracker.observe(&self.store);
        for t in &transitions {
            self.notifications.push(Notice::now(t.message()));
        }
        transitions
    }

    fn on_frame(&mut self, frame: Frame) {
        let is_snapshot = frame.is_snapshot();
        let translation = channel::translate(frame, &self.store);
        if let Some(gap) = translation.gap {
            self.backfill.request(gap.job_id, gap.after_seq, &self.tx);
        }
        match translation.action {
            Some(Action::Snapshot(jobs)) => {
                self.generation += 1;
                let deletes = self.coordinator.pending_deletes();
                self.store.apply(Action::Snapshot(jobs));
                for job_id in deletes.iter().filter(|id| !self.store.contains(id)) {
                    self.coordinator.server_deleted(job_id);
                }
            }
            Some(Action::Delete(job_id)) => {
                self.generation += 1;
                self.coordinator.server_deleted(&job_id);
                self.store.apply(Action::Delete(job_id));
            }
            Some(action) => self.store.apply(action),
            None => {}
        }
        if is_snapshot {
            self.last_sync = Some(Instant::now());
        }
    }

    /// Returns `false` when the operation was rolled back.
    fn on_mutation_result(&mut self, op_id: OpId, result: Result<Response, String>) -> bool {
        match result {
            Ok(response) => {
                let Some(resolution) = self.coordinator.confirm(op_id, response, &mut self.store) else {
                    tracing::debug!(op = %op_id, "result for unknown operation");
                    return true;
                };
                if let Some(patch) = resolution.follow_up {
                    self.send_follow_up(resolution.job_id.clone(), patch);
                }
                if let Some(goal) = resolution.settle {
                    self.start_settle(resolution.job_id, goal);
                }
                true
            }
            Err(e) => {
                if let Some(failure) = self.coordinator.fail(op_id, &e, &mut self.store) {
                    self.errors.push(Notice::now(failure.notice));
                }
                false
            }
        }
    }

    /// Validate and speculatively apply an operator mutation, then send it.
    pub fn submit(&mut self, mutation: Mutation) -> Result<(), Rejection> {
        let kind = mutation.kind();
        match self.coordinator.begin(mutation, &mut self.store) {
            Ok(Some(ticket)) => {
                self.dispatch(ticket);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(rejection) => {
                tracing::debug!(kind = kind.label(), %rejection, "mutation rejected");
                Err(rejection)
            }
        }
    }

    fn dispatch(&self, ticket: Ticket) {
        let api = Arc::clone(&self.api);
        let Ticket { op_id, request } = ticket;
        spawn_monitored(
            self.tx.clone(),
            "mutation",
            async move {
                let result = request.send(api.as_ref()).await.map_err(|e| e.to_string());
                SyncEvent::MutationResult { op_id, result }
            },
            move |msg| SyncEvent::MutationResult {
                op_id,
                result: Err(msg),
            },
        );
    }

    fn send_follow_up(&self, job_id: JobId, patch: JobPatch) {
        tracing::debug!(%job_id, ?patch, "sending follow-up update");
        let api = Arc::clone(&self.api);
        let crash_id = job_id.clone();
        spawn_monitored(
            self.tx.clone(),
            "follow_up",
            async move {
                let result = api.update_job(&job_id, &patch).await.map_err(|e| e.to_string());
                SyncEvent::FollowUpResult { job_id, result }
            },
            move |msg| SyncEvent::FollowUpResult {
                job_id: crash_id,
                result: Err(msg),
            },
        );
    }

    fn start_settle(&mut self, job_id: JobId, goal: SettleGoal) {
        let poller = SettlePoller::new(
            Arc::clone(&self.api),
            job_id.clone(),
            goal,
            self.config.settle_interval,
            self.config.settle_timeout,
            self.tx.clone(),
        );
        let handle = tokio::spawn(async move {
            let outcome = poller.run().await;
            tracing::debug!(?outcome, "settle poller finished");
        });
        // A newer start/stop supersedes the previous watcher for this job.
        if let Some(previous) = self.settles.insert(job_id, handle) {
            previous.abort();
        }
    }

    /// Kick off a full resync unless one is already in flight.
    pub fn request_resync(&mut self) -> bool {
        if !self.resync.try_begin() {
            tracing::debug!("resync already in flight, skipping");
            return false;
        }
        let api = Arc::clone(&self.api);
        let generation = self.generation;
        spawn_monitored(
            self.tx.clone(),
            "resync",
            async move {
                SyncEvent::ResyncResult {
                    generation,
                    result: api.list_jobs().await.map_err(|e| e.to_string()),
                }
            },
            move |msg| SyncEvent::ResyncResult {
                generation,
                result: Err(msg),
            },
        );
        true
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> + '_ {
        self.store.iter()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_pending(&self, job_id: &JobId) -> bool {
        self.coordinator.is_pending(job_id)
    }

    pub fn pending_count(&self) -> usize {
        self.coordinator.pending_count()
    }

    pub fn is_resyncing(&self) -> bool {
        self.resync.is_in_flight()
    }

    pub fn is_backfilling(&self, job_id: &JobId) -> bool {
        self.backfill.is_in_flight(job_id)
    }

    pub fn last_sync(&self) -> Option<Instant> {
        self.last_sync
    }

    pub fn errors(&self) -> &[Notice] {
        &self.errors
    }

    pub fn latest_error(&self) -> Option<&str> {
        self.errors.last().map(|n| n.message.as_str())
    }

    /// Drop the newest error notice.
    pub fn dismiss_error(&mut self) {
        self.errors.pop();
    }

    pub fn push_error(&mut self, message: String) {
        self.errors.push(Notice::now(message));
    }

    pub fn latest_notification(&self) -> Option<&str> {
        self.notifications.last().map(|n| n.message.as_str())
    }

    /// Expire notices and forget finished settle pollers.
    pub fn prune(&mut self) {
        self.errors
            .retain(|n| n.at.elapsed().as_secs() < ERROR_TTL_SECS);
        self.notifications
            .retain(|n| n.at.elapsed().as_secs() < NOTIFICATION_TTL_SECS);
        self.settles.retain(|_, handle| !handle.is_finished());
    }

    /// Abort every supervised task. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for handle in self.background.drain(..) {
            handle.abort();
        }
        for (_, handle) in self.settles.drain() {
            handle.abort();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
