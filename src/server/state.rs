use crate::{config::Config, http_retry::RetryConfig, metrics};
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling
    pub http_client: Client,
    /// Prometheus render handle for `/metrics`
    pub metrics: PrometheusHandle,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
    /// Binary relay tasks still copying upstream bodies
    pub relay_tasks: TaskTracker,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        // Redirects are followed by the default policy (up to 10 hops).
        // The read timeout bounds each body read so a stalled origin cannot pin a relay task.
        let http_client = Client::builder()
            .read_timeout(config.upstream_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            metrics: metrics::install(),
            shutdown: CancellationToken::new(),
            relay_tasks: TaskTracker::new(),
            started_at: Instant::now(),
        })
    }

    /// Retry policy for upstream fetches derived from config
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.config.upstream_max_retries,
            backoff: self.config.upstream_backoff,
            timeout: self.config.upstream_timeout,
        }
    }
}
