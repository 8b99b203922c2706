use crate::api::{JobPatch, JobsApi, LogPage};
use crate::model::{Job, JobId};
use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Upper bound on how much of an error body ends up in a notice.
const DETAIL_LIMIT: usize = 200;

pub struct HttpJobsApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpJobsApi {
    /// `base` is the REST root, as produced by `Endpoints::from_base`.
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client, base })
    }

    /// `base` joined with `segments`, each escaped as one path segment.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| eyre!("Server URL {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn job_url(&self, id: &JobId, action: Option<&str>) -> Result<Url> {
        match action {
            Some(action) => self.url(&[TABS, id.as_str(), action]),
            None => self.url(&[TABS, id.as_str()]),
        }
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let start = std::time::Instant::now();
        let path = url.path().to_string();
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                eyre!("{method} {path} timed out")
            } else if e.is_connect() {
                eyre!("Cannot reach server: {e}")
            } else {
                eyre!("{method} {path} failed: {e}")
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(eyre!("{}", classify_http_error(status, &text)));
        }

        tracing::debug!(
            %method,
            path,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis(),
            "request completed"
        );
        response
            .json::<T>()
            .await
            .map_err(|e| eyre!("Unexpected response from {path}: {e}"))
    }
}

const TABS: &str = "test-tabs";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_id: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct Deleted {
    #[serde(default)]
    deleted: bool,
}

#[async_trait]
impl JobsApi for HttpJobsApi {
    async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.send::<(), _>(Method::GET, self.url(&[TABS])?, None).await
    }

    async fn create_job(&self, title: &str, profile_id: Option<&str>) -> Result<Job> {
        let title = title.trim();
        let body = CreateBody {
            title: (!title.is_empty()).then_some(title),
            profile_id,
        };
        self.send(Method::POST, self.url(&[TABS])?, Some(&body)).await
    }

    async fn update_job(&self, id: &JobId, patch: &JobPatch) -> Result<Job> {
        self.send(Method::PUT, self.job_url(id, None)?, Some(patch)).await
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        let reply: Deleted = self.send::<(), _>(Method::DELETE, self.job_url(id, None)?, None).await?;
        if !reply.deleted {
            return Err(eyre!("Server did not confirm deletion of {id}"));
        }
        Ok(())
    }

    async fn start_job(&self, id: &JobId, profile_id: Option<&str>) -> Result<Job> {
        let url = self.job_url(id, Some("start"))?;
        self.send(Method::POST, url, Some(&StartBody { profile_id })).await
    }

    async fn stop_job(&self, id: &JobId) -> Result<Job> {
        let url = self.job_url(id, Some("stop"))?;
        self.send::<(), _>(Method::POST, url, None).await
    }

    async fn fetch_logs(&self, id: &JobId, after: u64) -> Result<LogPage> {
        let mut url = self.job_url(id, Some("logs"))?;
        url.query_pairs_mut().append_pair("after", &after.to_string());
        self.send::<(), _>(Method::GET, url, None).await
    }
}

/// One-line message for a non-2xx response: `HTTP <code>: <detail>`.
///
/// The backend reports failures as `{"detail": "..."}`; anything else is shown
/// trimmed and truncated.
pub fn classify_http_error(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string());

    let detail = if detail.chars().count() > DETAIL_LIMIT {
        let cut: String = detail.chars().take(DETAIL_LIMIT).collect();
        format!("{cut}…")
    } else {
        detail
    };

    if detail.is_empty() {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("request failed")
        )
    } else {
        format!("HTTP {}: {detail}", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classify_uses_detail_field() {
        let msg = classify_http_error(StatusCode::NOT_FOUND, r#"{"detail": "Tab not found"}"#);
        assert_eq!(msg, "HTTP 404: Tab not found");
    }

    #[test]
    fn classify_structured_detail() {
        let msg = classify_http_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": [{"loc": ["body"], "msg": "bad"}]}"#,
        );
        assert!(msg.starts_with("HTTP 422: ["));
    }

    #[test]
    fn classify_plain_body() {
        let msg = classify_http_error(StatusCode::BAD_GATEWAY, "  upstream down \n");
        assert_eq!(msg, "HTTP 502: upstream down");
    }

    #[test]
    fn classify_empty_body_uses_reason() {
        let msg = classify_http_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(msg, "HTTP 503: Service Unavailable");
    }

    #[test]
    fn classify_truncates_long_bodies() {
        let body = "x".repeat(500);
        let msg = classify_http_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(msg.ends_with('…'));
        assert!(msg.len() < 300);
    }

    fn api() -> HttpJobsApi {
        let base = Url::parse("http://127.0.0.1:8000/api/").expect("base url");
        HttpJobsApi::new(base, Duration::from_secs(1)).expect("client")
    }

    #[test]
    fn job_urls_keep_id_in_one_segment() {
        let api = api();
        let url = api.job_url(&JobId::from("3f2a"), Some("start")).expect("url");
        assert_eq!(url.path(), "/api/test-tabs/3f2a/start");

        let url = api.job_url(&JobId::from("a b+c/d"), None).expect("url");
        assert_eq!(url.path(), "/api/test-tabs/a%20b+c%2Fd");
        assert_eq!(url.path_segments().map(Iterator::count), Some(3));
    }

    #[test]
    fn base_without_trailing_slash_still_joins() {
        let base = Url::parse("http://127.0.0.1:8000/api").expect("base url");
        let api = HttpJobsApi::new(base, Duration::from_secs(1)).expect("client");
        assert_eq!(api.url(&[TABS]).expect("url").path(), "/api/test-tabs");
    }
}
