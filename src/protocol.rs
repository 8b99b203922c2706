//! Push-channel frames: one JSON object per WebSocket text message.
//!
//! The capture backend names its frames after "tabs" (`tab_created`, `tabId`);
//! both spellings decode to the same variants.

use crate::model::{Job, JobId, LogEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Snapshot {
        #[serde(alias = "tabs")]
        jobs: Vec<Job>,
    },
    #[serde(alias = "tab_created")]
    JobCreated {
        #[serde(alias = "tab")]
        job: Job,
    },
    #[serde(alias = "tab_updated")]
    JobUpdated {
        #[serde(alias = "tab")]
        job: Job,
    },
    #[serde(alias = "tab_deleted")]
    JobDeleted {
        #[serde(rename = "jobId", alias = "tabId")]
        job_id: JobId,
    },
    LogEntry {
        #[serde(rename = "jobId", alias = "tabId")]
        job_id: JobId,
        entry: LogEntry,
    },
    /// Sent once to every subscriber before the backend exits.
    ServerShutdown,
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::JobCreated { .. } => "job_created",
            Self::JobUpdated { .. } => "job_updated",
            Self::JobDeleted { .. } => "job_deleted",
            Self::LogEntry { .. } => "log_entry",
            Self::ServerShutdown => "server_shutdown",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot { .. })
    }
}

pub fn decode(text: &str) -> Result<Frame, serde_json::Error> {
    serde_json::from_str(text)
}

pub fn encode(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_backend_snapshot() {
        let text = r#"{"type": "snapshot", "tabs": [
            {"id": "a", "title": "A", "status": "idle", "createdUtc": "20240601T100000Z", "updatedUtc": "20240601T100000Z", "logs": [], "logSeq": 0}
        ]}"#;
        let frame = decode(text).expect("snapshot should decode");
        match frame {
            Frame::Snapshot { jobs } => {
                assert_eq!(jobs.len(), 1);
                assert_eq!(jobs[0].id, JobId::from("a"));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn decodes_both_spellings_of_updates() {
        let tab = decode(r#"{"type": "tab_updated", "tab": {"id": "a", "status": "running"}}"#)
            .expect("tab_updated");
        let job = decode(r#"{"type": "job_updated", "job": {"id": "a", "status": "running"}}"#)
            .expect("job_updated");
        assert_eq!(tab.kind(), "job_updated");
        match (tab, job) {
            (Frame::JobUpdated { job: a }, Frame::JobUpdated { job: b }) => {
                assert_eq!(a.status, JobStatus::Running);
                assert_eq!(a.id, b.id);
            }
            other => panic!("unexpected frames {other:?}"),
        }
    }

    #[test]
    fn decodes_deleted_and_log_entry() {
        let deleted = decode(r#"{"type": "tab_deleted", "tabId": "a"}"#).expect("tab_deleted");
        assert_eq!(deleted, Frame::JobDeleted { job_id: JobId::from("a") });

        let log = decode(
            r#"{"type": "log_entry", "jobId": "a", "entry": {"seq": 4, "timestamp": "20240601T100004Z", "message": "up", "interface": "eth0"}}"#,
        )
        .expect("log_entry");
        match log {
            Frame::LogEntry { job_id, entry } => {
                assert_eq!(job_id.as_str(), "a");
                assert_eq!(entry.seq, 4);
                assert_eq!(entry.interface.as_deref(), Some("eth0"));
            }
            other => panic!("expected log entry, got {other:?}"),
        }
    }

    #[test]
    fn decodes_server_shutdown() {
        assert_eq!(
            decode(r#"{"type": "server_shutdown"}"#).expect("shutdown"),
            Frame::ServerShutdown
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(decode(r#"{"type": "mystery"}"#).is_err());
        assert!(decode(r#"{"type": "log_entry", "jobId": "a"}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn encode_uses_canonical_names() {
        let text = encode(&Frame::JobDeleted { job_id: JobId::from("x") }).expect("encode");
        assert_eq!(text, r#"{"type":"job_deleted","jobId":"x"}"#);
    }
}
