use tracing::{error, info};
use veilstream::{config, server};

#[tokio::main]
async fn main() {
    // Setup logging
    tracing_subscriber::fmt::init();

    info!("🚀 Starting Veilstream - HLS rewriting proxy");

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Proxy route {} (timeout {}s, {} retries)",
        config.proxy_route,
        config.upstream_timeout.as_secs(),
        config.upstream_max_retries
    );

    if let Err(e) = server::start(config).await {
        error!("Failed to start server: {}", e);
        std::process::exit(1);
    }
}
