use crate::model::{Job, JobId, LogEntry};
use async_trait::async_trait;
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};

/// Partial update body for `update_job`. `None` fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

impl JobPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            profile_id: None,
        }
    }

    pub fn profile(profile_id: impl Into<String>) -> Self {
        Self {
            title: None,
            profile_id: Some(profile_id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.profile_id.is_none()
    }
}

/// Result of a log range fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    #[serde(default)]
    pub last_seq: Option<u64>,
}

/// The capture backend's job endpoints.
#[async_trait]
pub trait JobsApi: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<Job>>;
    async fn create_job(&self, title: &str, profile_id: Option<&str>) -> Result<Job>;
    async fn update_job(&self, id: &JobId, patch: &JobPatch) -> Result<Job>;
    async fn delete_job(&self, id: &JobId) -> Result<()>;
    /// `profile_id` overrides the job's stored profile for this run only.
    async fn start_job(&self, id: &JobId, profile_id: Option<&str>) -> Result<Job>;
    async fn stop_job(&self, id: &JobId) -> Result<Job>;
    /// Entries with `seq > after`, ascending.
    async fn fetch_logs(&self, id: &JobId, after: u64) -> Result<LogPage>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn patch_skips_unset_fields() {
        let body = serde_json::to_string(&JobPatch::profile("p-2")).expect("serialize");
        assert_eq!(body, r#"{"profileId":"p-2"}"#);
        assert!(JobPatch::default().is_empty());
    }

    #[test]
    fn log_page_parses_backend_shape() {
        let json = r#"{"tabId": "a", "entries": [{"seq": 1, "timestamp": "20240601T100000Z", "message": "x"}], "lastSeq": 1}"#;
        let page: LogPage = serde_json::from_str(json).expect("page");
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.last_seq, Some(1));
    }
}
