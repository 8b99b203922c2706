//! Fetches a missing log range for one job, at most one fetch per job at a time.
//!
//! A second gap on the same job while a fetch is outstanding is dropped: the
//! outstanding fetch covers everything after the older cursor, and anything
//! newer arrives as ordinary `log_entry` frames.

use crate::api::{JobsApi, LogPage};
use crate::events::{spawn_monitored, SyncEvent};
use crate::model::JobId;
use color_eyre::eyre::{eyre, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;

pub struct BackfillClient {
    api: Arc<dyn JobsApi>,
    retry_delay: Duration,
    in_flight: HashSet<JobId>,
}

impl BackfillClient {
    pub fn new(api: Arc<dyn JobsApi>, retry_delay: Duration) -> Self {
        Self {
            api,
            retry_delay,
            in_flight: HashSet::new(),
        }
    }

    /// Start fetching entries after `after` for `job_id`. Returns `false` if a
    /// fetch for that job is already outstanding.
    pub fn request(&mut self, job_id: JobId, after: u64, tx: &mpsc::UnboundedSender<SyncEvent>) -> bool {
        if !self.in_flight.insert(job_id.clone()) {
            tracing::debug!(%job_id, after_seq = after, "backfill already in flight, dropping");
            return false;
        }
        tracing::debug!(%job_id, after_seq = after, "backfill requested");

        let api = Arc::clone(&self.api);
        let retry_delay = self.retry_delay;
        let crash_id = job_id.clone();
        spawn_monitored(
            tx.clone(),
            "backfill",
            async move {
                let result = fetch_with_retry(api.as_ref(), &job_id, after, retry_delay)
                    .await
                    .map_err(|e| e.to_string());
                SyncEvent::BackfillResult { job_id, after, result }
            },
            move |msg| SyncEvent::BackfillResult {
                job_id: crash_id,
                after,
                result: Err(msg),
            },
        );
        true
    }

    /// Release the guard for `job_id`; called when its result is processed.
    pub fn complete(&mut self, job_id: &JobId) {
        self.in_flight.remove(job_id);
    }

    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.in_flight.contains(job_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// One fetch, and a single retry after `retry_delay` for transient failures.
pub async fn fetch_with_retry(
    api: &dyn JobsApi,
    job_id: &JobId,
    after: u64,
    retry_delay: Duration,
) -> Result<LogPage> {
    match api.fetch_logs(job_id, after).await {
        Ok(page) => Ok(page),
        Err(first_err) => {
            tracing::debug!(%job_id, error = %first_err, "backfill failed, retrying once");
            time::sleep(retry_delay).await;
            api.fetch_logs(job_id, after)
                .await
                .map_err(|retry_err| eyre!("{first_err} (retry also failed: {retry_err})"))
        }
    }
}
