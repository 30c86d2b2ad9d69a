use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crony_core::config::HeartbeatConfig;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::HeartbeatError;

/// Delivers one ping and returns the raw response body.
#[async_trait]
pub trait HeartbeatTransport: Send + Sync {
    async fn post(&self, url: &str, body: &str) -> Result<String, HeartbeatError>;
}

/// `reqwest`-backed transport.
pub struct HttpHeartbeatTransport {
    client: reqwest::Client,
}

impl HttpHeartbeatTransport {
    pub fn new(timeout: Duration) -> Result<Self, HeartbeatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HeartbeatError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HeartbeatTransport for HttpHeartbeatTransport {
    async fn post(&self, url: &str, body: &str) -> Result<String, HeartbeatError> {
        let resp = self
            .client
            .post(url)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| HeartbeatError::Transport(e.to_string()))?;
        resp.text()
            .await
            .map_err(|e| HeartbeatError::Transport(e.to_string()))
    }
}

/// Reports execution start and end to the heartbeat service.
///
/// Each report is a single logical request retried on transport failure:
/// no wait before the first attempt, then `backoff_base`, `2 * backoff_base`, …
/// Response bodies are never retried; they are classified once.
pub struct HeartbeatReporter {
    transport: Arc<dyn HeartbeatTransport>,
    base_url: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl HeartbeatReporter {
    pub fn new(
        transport: Arc<dyn HeartbeatTransport>,
        base_url: impl Into<String>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub fn from_config(
        transport: Arc<dyn HeartbeatTransport>,
        config: &HeartbeatConfig,
    ) -> Self {
        Self::new(
            transport,
            config.base_url.clone(),
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
        )
    }

    pub async fn start(&self, id: &str) -> Result<(), HeartbeatError> {
        self.ping(id, "start").await
    }

    pub async fn success(&self, id: &str) -> Result<(), HeartbeatError> {
        self.ping(id, "0").await
    }

    /// Report a failed run. The exit status is sent as a single byte, the
    /// range the heartbeat service accepts; codes outside it are reported as
    /// 255 so they can't wrap around to success.
    pub async fn fail(&self, id: &str, code: i64) -> Result<(), HeartbeatError> {
        let status = u8::try_from(code).unwrap_or(u8::MAX);
        self.ping(id, &status.to_string()).await
    }

    fn url(&self, id: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), id, suffix)
    }

    async fn ping(&self, id: &str, suffix: &str) -> Result<(), HeartbeatError> {
        let url = self.url(id, suffix);
        let mut last_err = HeartbeatError::Transport("no attempt made".to_string());

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let factor = 1u32 << (attempt - 2).min(16);
                sleep(self.backoff_base.saturating_mul(factor)).await;
            }

            match self.transport.post(&url, "").await {
                Ok(body) => {
                    debug!(%url, attempt, "heartbeat delivered");
                    return classify_response(id, &body);
                }
                Err(e) => {
                    warn!(%url, attempt, max = self.max_attempts, error = %e, "heartbeat attempt failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}

fn classify_response(id: &str, body: &str) -> Result<(), HeartbeatError> {
    match body {
        "OK" => Ok(()),
        "OK (not found)" => Err(HeartbeatError::NotFound { id: id.to_string() }),
        "OK (rate limited)" => Err(HeartbeatError::RateLimited),
        other => Err(HeartbeatError::UnrecognizedResponse(other.to_string())),
    }
}
