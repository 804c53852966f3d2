pub mod browser_headers;
pub mod config;
pub mod error;
pub mod hls;
pub mod http_retry;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod token;
