//! HTTP operations for the scheduler
//!
//! Builds the closures that `rt fetch` hands to the scheduler. Each one does
//! a single GET and reports status and size; retries are left to the caller.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::Priority;
use crate::scheduler::{Outcome, SchedulerHandle};

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout enforced by the HTTP client
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// User-Agent header value
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("reqthrottle/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build a reqwest client from this configuration
    pub fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        debug!(timeout_ms = self.timeout_ms, "HttpConfig::build_client: called");
        Ok(reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(&self.user_agent)
            .build()?)
    }
}

/// Errors from a single fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Network(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub bytes: usize,
    pub elapsed_ms: u64,
}

/// GET `url` and read the whole body
///
/// Non-2xx responses are errors.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<FetchResponse, FetchError> {
    debug!(%url, "fetch: called");
    let started = Instant::now();

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        debug!(%url, %status, "fetch: non-success status");
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response.bytes().await?;
    Ok(FetchResponse {
        url: url.to_string(),
        status: status.as_u16(),
        bytes: body.len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Queue a fetch of `url` on the scheduler
pub fn submit_fetch(
    scheduler: &SchedulerHandle,
    client: &reqwest::Client,
    url: &str,
    priority: Priority,
) -> Outcome<FetchResponse, FetchError> {
    let client = client.clone();
    let url = url.to_string();
    scheduler.submit(move || async move { fetch(&client, &url).await }, priority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_http_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("reqthrottle/"));
    }

    #[test]
    fn test_build_client() {
        assert!(HttpConfig::default().build_client().is_ok());
    }

    #[test]
    fn test_status_error_message() {
        let err = FetchError::Status {
            status: 503,
            url: "http://example.invalid/trails".to_string(),
        };
        assert_eq!(err.status(), Some(503));

        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("example.invalid/trails"));
    }
}
