//! Upstream HTTP fetch with retry, linear backoff and per-attempt timeout.
//!
//! [`fetch_with_retry`] retries network failures, `429` and `5xx` responses.
//! Any other response (including `403`/`404`) is returned to the caller as-is
//! on the attempt that produced it.

use crate::metrics;
use axum::http::{HeaderMap, StatusCode};
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default backoff step in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Configuration for [`fetch_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Backoff step; the delay before retry `n` is `n * backoff`.
    pub backoff: Duration,
    /// Wall-clock bound applied to each individual attempt.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, including the first.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Terminal outcome of a failed upstream fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("upstream request failed: {0}")]
    Network(reqwest::Error),

    #[error("upstream returned {0}")]
    Status(StatusCode),
}

/// Returns `true` for statuses worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Fetch a URL via HTTP GET with automatic retry and backoff.
///
/// Each attempt sends the same `headers` and is bounded by `config.timeout`;
/// an attempt that exceeds it is cancelled by dropping the request future.
/// Redirects are followed by the client.
///
/// # Errors
///
/// - [`FetchError::Timeout`] if the final attempt timed out
/// - [`FetchError::Network`] if the final attempt failed at the transport level
/// - [`FetchError::Status`] if the final attempt returned `429` or `5xx`
pub async fn fetch_with_retry(
    client: &Client,
    url: &Url,
    headers: HeaderMap,
    config: &RetryConfig,
) -> Result<Response, FetchError> {
    let total = config.total_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let is_final = attempt >= total;

        let request = client.get(url.as_str()).headers(headers.clone());

        let failure = match tokio::time::timeout(config.timeout, request.send()).await {
            Ok(Ok(response)) if !is_retryable_status(response.status()) => {
                debug!(
                    "Upstream responded {} (attempt {}/{})",
                    response.status(),
                    attempt,
                    total
                );
                return Ok(response);
            }
            Ok(Ok(response)) => {
                warn!(
                    "Upstream returned {} (attempt {}/{})",
                    response.status(),
                    attempt,
                    total
                );
                FetchError::Status(response.status())
            }
            Ok(Err(e)) => {
                let e = e.without_url();
                warn!("Upstream fetch failed (attempt {}/{}): {}", attempt, total, e);
                FetchError::Network(e)
            }
            Err(_) => {
                warn!(
                    "Upstream fetch timed out after {}ms (attempt {}/{})",
                    config.timeout.as_millis(),
                    attempt,
                    total
                );
                FetchError::Timeout { attempts: attempt }
            }
        };

        if is_final {
            metrics::record_upstream_error();
            return Err(failure);
        }

        let delay = config.backoff_for(attempt);
        warn!("Retrying upstream fetch in {}ms...", delay.as_millis());
        metrics::record_upstream_retry();
        tokio::time::sleep(delay).await;
    }
}
