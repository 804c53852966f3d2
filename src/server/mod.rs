pub mod handlers;
pub mod state;
pub mod url_validation;

use crate::{config::Config, error::ProxyError};
use axum::{
    Router,
    http::{HeaderName, HeaderValue},
    routing::get,
};
use state::AppState;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info};

/// Response header carrying the running version
pub const VERSION_HEADER: &str = "x-veilstream-version";

/// Build the router for the given configuration.
///
/// # Errors
/// Fails if the upstream HTTP client cannot be constructed.
pub fn build_router(config: Config) -> Result<Router, ProxyError> {
    let state = AppState::new(config)
        .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {e}")))?;
    Ok(router_with_state(state))
}

/// Build the router around an existing state.
pub fn router_with_state(state: AppState) -> Router {
    let proxy_route = state.config.proxy_route.clone();

    Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::serve_metrics))
        .route(
            &proxy_route,
            get(handlers::proxy::serve_proxy).options(handlers::proxy::preflight),
        )
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(VERSION_HEADER),
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    // Create shared application state
    let state = AppState::new(config)?;
    let shutdown = state.shutdown.clone();
    let relay_tasks = state.relay_tasks.clone();

    let app = router_with_state(state);

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("🚀 Server listening on http://{}", addr);

    // Start serving
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    relay_tasks.close();
    relay_tasks.wait().await;
    info!("Server stopped");

    Ok(())
}

/// Wait for Ctrl-C, then cancel in-flight relays so connections can drain.
async fn shutdown_signal(shutdown: tokio_util::sync::CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
