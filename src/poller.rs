//! Timer-driven pullers: the fallback resync poller and the per-job settle poller.
//!
//! The fallback poller only emits [`SyncEvent::ResyncDue`]; the engine owns the
//! [`ResyncGate`] and performs the fetch, so a tick that fires while a resync
//! is still outstanding is skipped rather than queued.

use crate::api::JobsApi;
use crate::channel::ConnectionState;
use crate::events::SyncEvent;
use crate::model::{JobId, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time;

pub struct FallbackPoller {
    interval: Duration,
    state_rx: watch::Receiver<ConnectionState>,
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl FallbackPoller {
    pub fn new(
        interval: Duration,
        state_rx: watch::Receiver<ConnectionState>,
        tx: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            interval,
            state_rx,
            tx,
        }
    }

    pub async fn run(mut self) {
        loop {
            // Idle until the push channel is down.
            while *self.state_rx.borrow_and_update() != ConnectionState::Disconnected {
                if self.state_rx.changed().await.is_err() {
                    return;
                }
            }
            tracing::info!(interval_ms = self.interval.as_millis(), "fallback polling active");

            loop {
                if self.tx.send(SyncEvent::ResyncDue).is_err() {
                    return;
                }
                // Wake early if the channel state moves.
                let state_changed = tokio::select! {
                    () = time::sleep(self.interval) => false,
                    changed = self.state_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        true
                    }
                };
                if state_changed
                    && *self.state_rx.borrow_and_update() != ConnectionState::Disconnected
                {
                    tracing::info!("fallback polling paused");
                    break;
                }
            }
        }
    }
}

/// At most one full resync in flight.
#[derive(Debug, Default)]
pub struct ResyncGate {
    in_flight: bool,
}

impl ResyncGate {
    /// Claim the gate. `false` means a resync is already outstanding and this
    /// tick should be skipped.
    pub fn try_begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleGoal {
    Start,
    Stop,
}

impl SettleGoal {
    pub fn is_settled(self, status: JobStatus) -> bool {
        match self {
            Self::Start => status != JobStatus::Starting,
            Self::Stop => !status.is_active(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled { attempts: u32 },
    /// Gave up waiting; later push or poll updates take over.
    TimedOut { attempts: u32 },
    /// The job no longer exists on the server.
    Vanished,
    /// The engine stopped listening.
    Abandoned,
}

/// `⌈timeout / interval⌉`, and at least one attempt.
pub fn max_attempts(interval: Duration, timeout: Duration) -> u32 {
    let interval = interval.as_millis().max(1);
    let attempts = timeout.as_millis().div_ceil(interval).max(1);
    u32::try_from(attempts).unwrap_or(u32::MAX)
}

/// Polls one job after a start or stop until its status leaves the transient
/// state, or the timeout elapses. Each observation is forwarded to the engine.
pub struct SettlePoller {
    api: Arc<dyn JobsApi>,
    job_id: JobId,
    goal: SettleGoal,
    interval: Duration,
    timeout: Duration,
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SettlePoller {
    pub fn new(
        api: Arc<dyn JobsApi>,
        job_id: JobId,
        goal: SettleGoal,
        interval: Duration,
        timeout: Duration,
        tx: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            api,
            job_id,
            goal,
            interval,
            timeout,
            tx,
        }
    }

    pub async fn run(self) -> SettleOutcome {
        let attempts = max_attempts(self.interval, self.timeout);
        for attempt in 1..=attempts {
            time::sleep(self.interval).await;
            // The backend has no single-job read; list and pick.
            let jobs = match self.api.list_jobs().await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::debug!(job_id = %self.job_id, attempt, error = %e, "settle poll failed");
                    continue;
                }
            };
            let Some(job) = jobs.into_iter().find(|j| j.id == self.job_id) else {
                tracing::debug!(job_id = %self.job_id, "settle poll: job gone");
                return SettleOutcome::Vanished;
            };
            let settled = self.goal.is_settled(job.status);
            if self.tx.send(SyncEvent::SettleObserved(job)).is_err() {
                return SettleOutcome::Abandoned;
            }
            if settled {
                tracing::debug!(job_id = %self.job_id, attempt, "status settled");
                return SettleOutcome::Settled { attempts: attempt };
            }
        }
        tracing::debug!(job_id = %self.job_id, attempts, "settle poll timed out");
        SettleOutcome::TimedOut { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{JobPatch, LogPage};
    use crate::model::Job;
    use async_trait::async_trait;
    use color_eyre::eyre::{eyre, Result};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// `list_jobs` walks through `statuses`, repeating the last one.
    struct Scripted {
        statuses: Vec<JobStatus>,
        calls: AtomicUsize,
        missing: bool,
    }

    impl Scripted {
        fn new(statuses: Vec<JobStatus>) -> Self {
            Self {
                statuses,
                calls: AtomicUsize::new(0),
                missing: false,
            }
        }
    }

    #[async_trait]
    impl JobsApi for Scripted {
        async fn list_jobs(&self) -> Result<Vec<Job>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing {
                return Ok(Vec::new());
            }
            let idx = call.min(self.statuses.len() - 1);
            let mut job = Job::new(JobId::from("a"), "A");
            job.status = self.statuses[idx];
            Ok(vec![job])
        }
        async fn create_job(&self, _: &str, _: Option<&str>) -> Result<Job> {
            Err(eyre!("unused"))
        }
        async fn update_job(&self, _: &JobId, _: &JobPatch) -> Result<Job> {
            Err(eyre!("unused"))
        }
        async fn delete_job(&self, _: &JobId) -> Result<()> {
            Err(eyre!("unused"))
        }
        async fn start_job(&self, _: &JobId, _: Option<&str>) -> Result<Job> {
            Err(eyre!("unused"))
        }
        async fn stop_job(&self, _: &JobId) -> Result<Job> {
            Err(eyre!("unused"))
        }
        async fn fetch_logs(&self, _: &JobId, _: u64) -> Result<LogPage> {
            Err(eyre!("unused"))
        }
    }

    fn settle(api: Arc<Scripted>, goal: SettleGoal, tx: mpsc::UnboundedSender<SyncEvent>) -> SettlePoller {
        SettlePoller::new(
            api,
            JobId::from("a"),
            goal,
            Duration::from_secs(1),
            Duration::from_secs(20),
            tx,
        )
    }

    #[test]
    fn settled_predicates() {
        assert!(!SettleGoal::Start.is_settled(JobStatus::Starting));
        assert!(SettleGoal::Start.is_settled(JobStatus::Running));
        assert!(SettleGoal::Start.is_settled(JobStatus::Failed));
        assert!(!SettleGoal::Stop.is_settled(JobStatus::Running));
        assert!(!SettleGoal::Stop.is_settled(JobStatus::Starting));
        assert!(SettleGoal::Stop.is_settled(JobStatus::Cancelled));
    }

    #[test]
    fn attempts_round_up() {
        assert_eq!(max_attempts(Duration::from_secs(1), Duration::from_secs(20)), 20);
        assert_eq!(max_attempts(Duration::from_secs(3), Duration::from_secs(20)), 7);
        assert_eq!(max_attempts(Duration::from_secs(5), Duration::ZERO), 1);
        assert_eq!(max_attempts(Duration::ZERO, Duration::from_millis(3)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_that_never_settles_polls_exactly_twenty_times() {
        let api = Arc::new(Scripted::new(vec![JobStatus::Running]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = time::Instant::now();

        let outcome = settle(Arc::clone(&api), SettleGoal::Stop, tx).run().await;

        assert_eq!(outcome, SettleOutcome::TimedOut { attempts: 20 });
        assert_eq!(api.calls.load(Ordering::SeqCst), 20);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        let mut observed = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, SyncEvent::SettleObserved(_)));
            observed += 1;
        }
        assert_eq!(observed, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn start_settles_once_running() {
        let api = Arc::new(Scripted::new(vec![
            JobStatus::Starting,
            JobStatus::Starting,
            JobStatus::Running,
        ]));
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = settle(Arc::clone(&api), SettleGoal::Start, tx).run().await;
        assert_eq!(outcome, SettleOutcome::Settled { attempts: 3 });
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_job_stops_polling() {
        let mut scripted = Scripted::new(vec![JobStatus::Running]);
        scripted.missing = true;
        let api = Arc::new(scripted);
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = settle(Arc::clone(&api), SettleGoal::Stop, tx).run().await;
        assert_eq!(outcome, SettleOutcome::Vanished);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_skips_overlapping_ticks() {
        let mut gate = ResyncGate::default();
        assert!(gate.try_begin());
        assert!(!gate.try_begin());
        assert!(gate.is_in_flight());
        gate.finish();
        assert!(gate.try_begin());
    }

    fn drain_resyncs(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> usize {
        let mut n = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SyncEvent::ResyncDue) {
                n += 1;
            }
        }
        n
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_runs_only_while_disconnected() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(FallbackPoller::new(Duration::from_secs(3), state_rx, tx).run());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(drain_resyncs(&mut rx), 0);

        // Immediate tick on activation, then one per interval.
        state_tx.send_replace(ConnectionState::Disconnected);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(drain_resyncs(&mut rx), 1);
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(drain_resyncs(&mut rx), 1);
        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(drain_resyncs(&mut rx), 2);

        state_tx.send_replace(ConnectionState::Connected);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(drain_resyncs(&mut rx), 0);

        drop(state_tx);
        handle.await.expect("poller exits when the channel manager goes away");
    }
}
