//! Timings and endpoint derivation for the sync engine.

use color_eyre::eyre::{bail, Result, WrapErr};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Pause between a closed push connection and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Full-resync period while the push channel is down.
    pub fallback_interval: Duration,
    pub settle_interval: Duration,
    pub settle_timeout: Duration,
    pub backfill_retry_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            fallback_interval: Duration::from_secs(3),
            settle_interval: Duration::from_secs(1),
            settle_timeout: Duration::from_secs(20),
            backfill_retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// REST base and push-channel URL derived from one server base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub rest: Url,
    pub ws: Url,
}

impl Endpoints {
    pub fn from_base(base: &str) -> Result<Self> {
        let mut rest = Url::parse(base.trim()).wrap_err_with(|| format!("invalid server URL: {base}"))?;
        let ws_scheme = match rest.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => bail!("unsupported scheme '{other}' in {base} (expected http or https)"),
        };
        // Url::join replaces the last path segment unless the base ends in '/'.
        if !rest.path().ends_with('/') {
            let path = format!("{}/", rest.path());
            rest.set_path(&path);
        }
        let mut ws = rest.join("test-tabs/ws")?;
        if ws.set_scheme(ws_scheme).is_err() {
            bail!("cannot derive websocket URL from {base}");
        }
        Ok(Self { rest, ws })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_timings() {
        let config = SyncConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.fallback_interval, Duration::from_secs(3));
        assert_eq!(config.settle_interval, Duration::from_secs(1));
        assert_eq!(config.settle_timeout, Duration::from_secs(20));
    }

    #[test]
    fn derives_ws_url_from_http_base() {
        let endpoints = Endpoints::from_base(DEFAULT_SERVER).expect("valid base");
        assert_eq!(endpoints.rest.as_str(), "http://127.0.0.1:8000/api/");
        assert_eq!(endpoints.ws.as_str(), "ws://127.0.0.1:8000/api/test-tabs/ws");
    }

    #[test]
    fn https_maps_to_wss_and_keeps_trailing_slash() {
        let endpoints = Endpoints::from_base("https://probe.local/api/").expect("valid base");
        assert_eq!(endpoints.rest.as_str(), "https://probe.local/api/");
        assert_eq!(endpoints.ws.as_str(), "wss://probe.local/api/test-tabs/ws");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(Endpoints::from_base("ftp://probe.local/api").is_err());
        assert!(Endpoints::from_base("not a url").is_err());
    }
}
