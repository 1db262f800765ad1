use crate::config::CollectorConfig;
use crate::error::CollectorError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: CollectorConfig,
}

impl HttpClient {
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// GET a JSON document, retrying transient failures with jittered
    /// exponential backoff. 404 is reported as `NotFound` without retry.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CollectorError> {
        let mut attempt = 0u32;
        RetryIf::start(
            self.backoff(),
            || {
                attempt += 1;
                self.get_json_once(url, attempt)
            },
            |e: &CollectorError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{}, retrying", e);
                }
                retry
            },
        )
        .await
    }

    /// Delays of roughly `retry_base_ms`, doubling per attempt, capped at 30s.
    fn backoff(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(2)
            .factor((self.config.retry_base_ms / 2).max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize)
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        attempt: u32,
    ) -> Result<T, CollectorError> {
        debug!("GET {} (attempt {})", url, attempt);

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CollectorError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(CollectorError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp.json::<T>().await?)
    }

    /// Sleep for the configured delay + random jitter.
    pub async fn polite_delay(&self) {
        let base = Duration::from_millis(self.config.request_delay_ms);
        let extra = jitter(Duration::from_millis(self.config.jitter_ms));
        sleep(base + extra).await;
    }
}
