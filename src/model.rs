//! Job ("test tab") data model shared by the reducer, the wire codec and the console.

use crate::log_window::LogWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that marks a client-assigned placeholder id. The server never hands
/// out ids with this prefix.
pub const TEMP_ID_PREFIX: &str = "temp:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Placeholder identity for a job whose create request is still in flight.
    /// `n` is negative so it can never collide with a server counter.
    pub fn temporary(n: i64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{n}"))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-confirmed lifecycle: idle → starting → running → {completed | failed | cancelled}.
/// `cancelled` is also reachable straight from `starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn can_start(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }

    pub fn can_stop(self) -> bool {
        self.is_active()
    }

    /// Whether the server may legitimately move a job from `self` to `next`.
    /// A terminal job only leaves its state through a fresh start.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Idle => next == Self::Starting,
            Self::Starting => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => {
                matches!(next, Self::Idle | Self::Starting)
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic per job, assigned by the server.
    pub seq: u64,
    #[serde(with = "timestamp", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
    /// Capture interface that produced the line, for multi-interface runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl LogEntry {
    pub fn new(seq: u64, message: impl Into<String>) -> Self {
        Self {
            seq,
            timestamp: Utc::now(),
            message: message.into(),
            interface: None,
        }
    }
}

/// One execution of a job. A fresh start always carries a new run id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(
        rename = "startedUtc",
        alias = "startedAt",
        with = "timestamp",
        default = "Utc::now"
    )]
    pub started_at: DateTime<Utc>,
    #[serde(
        rename = "finishedUtc",
        alias = "finishedAt",
        with = "timestamp::option",
        default
    )]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Per-interface exit codes; `None` entries are interfaces that never reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_codes: Option<Vec<Option<i32>>>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub logs: LogWindow,
    /// Highest seq ever observed, independent of what the window still retains.
    #[serde(default)]
    pub log_seq: u64,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub run: Option<Run>,
    #[serde(
        rename = "createdUtc",
        alias = "createdAt",
        with = "timestamp",
        default = "Utc::now"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "updatedUtc",
        alias = "updatedAt",
        with = "timestamp",
        default = "Utc::now"
    )]
    pub updated_at: DateTime<Utc>,
    /// Set locally while a stop request is unanswered. Any server copy clears it.
    #[serde(skip)]
    pub stop_requested: bool,
}

impl Job {
    pub fn new(id: JobId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            profile_id: None,
            status: JobStatus::Idle,
            logs: LogWindow::default(),
            log_seq: 0,
            last_message: None,
            run: None,
            created_at: now,
            updated_at: now,
            stop_requested: false,
        }
    }

    /// Re-establish `log_seq >= max(seq in logs)` and the displayed last message.
    pub fn normalize(&mut self) {
        if let Some(max) = self.logs.max_seq() {
            self.log_seq = self.log_seq.max(max);
        }
        self.refresh_last_message();
    }

    pub(crate) fn refresh_last_message(&mut self) {
        if let Some(last) = self.logs.last() {
            self.last_message = Some(last.message.clone());
        }
    }

    /// Full replacement by `incoming` that keeps log entries the new payload omits.
    pub fn absorb(&mut self, incoming: Job) {
        let prior_logs = std::mem::take(&mut self.logs);
        let prior_seq = self.log_seq;
        let prior_message = self.last_message.take();

        *self = incoming;
        self.logs.merge(prior_logs);
        self.log_seq = self.log_seq.max(prior_seq);
        if self.last_message.is_none() {
            self.last_message = prior_message;
        }
        self.normalize();
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled test"
        } else {
            &self.title
        }
    }
}

/// Compact UTC timestamps (`20240601T101500Z`) as written by the capture backend.
/// RFC 3339 is accepted on input as well.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    const COMPACT: &str = "%Y%m%dT%H%M%SZ";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, COMPACT)
            .map(|naive| naive.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            })
    }

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.format(COMPACT).to_string()
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_some(&super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use pretty_assertions::assert_eq;

    #[test]
    fn temporary_ids_are_tagged() {
        let id = JobId::temporary(-3);
        assert!(id.is_temporary());
        assert_eq!(id.as_str(), "temp:-3");
        assert!(!JobId::from("t-42").is_temporary());
    }

    #[test]
    fn start_and_stop_guards() {
        assert!(JobStatus::Idle.can_start());
        assert!(JobStatus::Failed.can_start());
        assert!(!JobStatus::Running.can_start());
        assert!(JobStatus::Starting.can_stop());
        assert!(!JobStatus::Completed.can_stop());
    }

    #[test]
    fn state_machine_edges() {
        assert!(JobStatus::Idle.can_transition_to(JobStatus::Starting));
        assert!(JobStatus::Starting.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Idle.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Cancelled.can_transition_to(JobStatus::Starting));
    }

    #[test]
    fn parses_backend_job_payload() {
        let json = r#"{
            "id": "3f2a",
            "title": "Uplink soak",
            "profileId": "p-1",
            "status": "running",
            "createdUtc": "20240601T101500Z",
            "updatedUtc": "20240601T102000Z",
            "run": {
                "id": "r-9",
                "profileId": "p-1",
                "startedUtc": "20240601T101600Z",
                "finishedUtc": null,
                "exitCode": null,
                "cancelled": false,
                "error": null,
                "interfaces": ["eth0", "eth1"]
            },
            "logs": [
                {"seq": 2, "timestamp": "20240601T101601Z", "message": "b", "tabId": "3f2a"},
                {"seq": 1, "timestamp": "20240601T101600Z", "message": "a", "tabId": "3f2a"}
            ],
            "logSeq": 2,
            "lastMessage": "b"
        }"#;
        let job: Job = serde_json::from_str(json).expect("job should parse");
        assert_eq!(job.id, JobId::from("3f2a"));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.created_at.hour(), 10);
        assert_eq!(job.created_at.minute(), 15);
        let seqs: Vec<u64> = job.logs.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        let run = job.run.expect("run present");
        assert_eq!(run.interfaces, Some(vec!["eth0".to_string(), "eth1".to_string()]));
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn accepts_rfc3339_and_camel_aliases() {
        let json = r#"{"id": "a", "title": "x", "createdAt": "2024-06-01T10:00:00Z", "updatedAt": "2024-06-01T10:00:00+02:00"}"#;
        let job: Job = serde_json::from_str(json).expect("job should parse");
        assert_eq!(job.created_at.year(), 2024);
        assert_eq!(job.updated_at.hour(), 8);
        assert_eq!(job.status, JobStatus::Idle);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let json = r#"{"id": "a", "createdUtc": "yesterday"}"#;
        assert!(serde_json::from_str::<Job>(json).is_err());
    }

    #[test]
    fn timestamp_round_trips_compact_form() {
        let ts = timestamp::parse("20240601T101500Z").expect("parse");
        assert_eq!(timestamp::format(&ts), "20240601T101500Z");
    }

    #[test]
    fn normalize_lifts_log_seq() {
        let mut job = Job::new(JobId::from("a"), "t");
        job.logs.insert(LogEntry::new(7, "seven"));
        job.log_seq = 3;
        job.normalize();
        assert_eq!(job.log_seq, 7);
        assert_eq!(job.last_message.as_deref(), Some("seven"));
    }

    #[test]
    fn absorb_keeps_omitted_logs() {
        let mut job = Job::new(JobId::from("a"), "old");
        job.logs.insert(LogEntry::new(1, "one"));
        job.logs.insert(LogEntry::new(2, "two"));
        job.log_seq = 2;

        let mut incoming = Job::new(JobId::from("a"), "new");
        incoming.status = JobStatus::Running;
        job.absorb(incoming);

        assert_eq!(job.title, "new");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.logs.len(), 2);
        assert_eq!(job.log_seq, 2);
        assert_eq!(job.last_message.as_deref(), Some("two"));
    }
}
