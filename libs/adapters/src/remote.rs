//! Shared HTTP core for the cloud data-plane consumers.
//!
//! Cloud adapters never hold SDK state; they are thin JSON clients of the
//! provider's governance data plane, authenticated with a bearer token.
//! Transient `429`/`503` responses are retried with jittered exponential
//! backoff before surfacing as `RATE_LIMITED`.

use rand::Rng;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub(crate) struct RemoteConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
}

#[derive(Debug)]
pub(crate) enum RemoteError {
    /// Retries exhausted on a transient status.
    RateLimited(String),
    /// Connection-level failure; the backend is unreachable.
    Transport(String),
    /// Non-2xx response the caller did not claim as semantic.
    Status(StatusCode, String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::RateLimited(m) => write!(f, "rate limited: {m}"),
            RemoteError::Transport(m) => write!(f, "transport: {m}"),
            RemoteError::Status(code, m) => write!(f, "status {code}: {m}"),
        }
    }
}

pub(crate) struct RemoteClient {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a request, retrying transient statuses. Returns the final
    /// response regardless of status so callers can treat specific codes
    /// (404, 409) as semantic.
    pub async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, RemoteError> {
        let url = self.url(path);
        let attempts = self.config.retry_count + 1;

        for attempt in 0..attempts {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = &self.config.api_token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if (status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE)
                        && attempt + 1 < attempts
                    {
                        let delay = backoff_delay(attempt);
                        warn!(%url, %status, attempt, delay_ms = delay.as_millis() as u64, "transient status, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(RemoteError::RateLimited(url));
                    }
                    debug!(%url, %status, "remote call completed");
                    return Ok(response);
                }
                Err(e) if attempt + 1 < attempts && e.is_connect() => {
                    let delay = backoff_delay(attempt);
                    warn!(%url, error = %e, attempt, "connect failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(RemoteError::Transport(e.to_string())),
            }
        }
        Err(RemoteError::RateLimited(url))
    }

    /// Send and require a 2xx, decoding the JSON body.
    pub async fn send_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RemoteError> {
        let response = self.send(method, path, body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status(status, text));
        }
        response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(format!("failed to parse response: {e}")))
    }
}

/// Construct the shared data-plane client for a cloud bundle.
pub(crate) fn build_client(
    endpoint: &str,
    token: Option<&str>,
    timeout_ms: u64,
) -> Result<std::sync::Arc<RemoteClient>, RemoteError> {
    RemoteClient::new(RemoteConfig {
        base_url: endpoint.to_string(),
        api_token: token.map(str::to_string),
        timeout_ms,
        retry_count: 3,
    })
    .map(std::sync::Arc::new)
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = 250u64.saturating_mul(1 << attempt.min(4));
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(base + jitter)
}
