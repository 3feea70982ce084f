//! HTTP access to playlists and segments, with retry and backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Downloads playlist bodies and segment bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * 2^n` plus jitter.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add random jitter of `[0, base_delay / 2)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Outcome of a single attempt.
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure (connect, timeout, 5xx).
    Retry(FetchError),
    /// Permanent failure (4xx, redirect loop).
    Fail(FetchError),
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// retries or `token` is cancelled.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0u32;
    loop {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::select! {
                    _ = token.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

fn classify_status(status: StatusCode, url: &str) -> FetchError {
    FetchError::Status {
        status: status.as_u16(),
        url: url.to_string(),
    }
}

/// [`MediaFetcher`] over a shared reqwest client. The client carries the
/// per-request deadline.
pub struct HttpMediaFetcher {
    client: Client,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl HttpMediaFetcher {
    pub fn new(client: Client, policy: RetryPolicy, token: CancellationToken) -> Self {
        Self {
            client,
            policy,
            token,
        }
    }

    async fn get(&self, url: &str) -> RetryAction<reqwest::Response> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if is_retryable_reqwest_error(&e) => return RetryAction::Retry(e.into()),
            Err(e) => return RetryAction::Fail(e.into()),
        };

        let status = response.status();
        if status.is_success() {
            RetryAction::Success(response)
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            RetryAction::Retry(classify_status(status, url))
        } else {
            RetryAction::Fail(classify_status(status, url))
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        retry_with_backoff(&self.policy, &self.token, |_| async {
            match self.get(url).await {
                RetryAction::Success(response) => match response.text().await {
                    Ok(text) => RetryAction::Success(text),
                    Err(e) => RetryAction::Retry(e.into()),
                },
                RetryAction::Retry(e) => RetryAction::Retry(e),
                RetryAction::Fail(e) => RetryAction::Fail(e),
            }
        })
        .await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        retry_with_backoff(&self.policy, &self.token, |_| async {
            match self.get(url).await {
                RetryAction::Success(response) => match response.bytes().await {
                    Ok(bytes) => RetryAction::Success(bytes),
                    Err(e) => RetryAction::Retry(e.into()),
                },
                RetryAction::Retry(e) => RetryAction::Retry(e),
                RetryAction::Fail(e) => RetryAction::Fail(e),
            }
        })
        .await
    }
}
