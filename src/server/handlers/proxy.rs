use crate::{
    browser_headers::upstream_headers,
    error::{ProxyError, Result},
    hls::rewriter::RewriteMode,
    http_retry::fetch_with_retry,
    metrics,
    relay::{RelayOptions, relay},
    server::{state::AppState, url_validation::validate_upstream_url},
    token,
};
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Query parameters of the proxy endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ProxyParams {
    /// Reference token (required)
    pub jj: Option<String>,
    /// `"1"` selects direct rewrite mode
    pub dd: Option<String>,
    /// Referer override for the upstream request
    #[serde(rename = "ref")]
    pub referer: Option<String>,
}

/// Proxy a manifest or segment referenced by the `jj` token
///
/// # Query Parameters
/// * `jj` — reference token
/// * `dd` — `1` to rewrite manifest segments as direct origin URLs
/// * `ref` — Referer sent upstream instead of the derived origin
pub async fn serve_proxy(
    State(state): State<AppState>,
    params: std::result::Result<Query<ProxyParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();

    let result = match params {
        Ok(Query(params)) => proxy(&state, &params, &headers).await,
        Err(rejection) => Err(ProxyError::InvalidQuery(rejection.body_text())),
    };
    let response = result.unwrap_or_else(IntoResponse::into_response);

    metrics::record_request("proxy", response.status().as_u16());
    metrics::record_duration("proxy", start);
    response
}

async fn proxy(state: &AppState, params: &ProxyParams, headers: &HeaderMap) -> Result<Response> {
    let token = params
        .jj
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or(ProxyError::MissingToken)?;

    // Decode and validate before touching the network
    let kind = token::classify(token);
    let url = token::decode(token)?;
    validate_upstream_url(&url, state.config.block_private_upstreams)?;

    let mode = RewriteMode::from_flag(params.dd.as_deref());
    info!("Proxying {:?} reference ({:?} mode)", kind, mode);
    debug!("Resolved upstream URL: {}", url);

    let outbound = upstream_headers(
        headers,
        &url,
        params.referer.as_deref(),
        &state.config.browser,
    );

    let upstream = fetch_with_retry(&state.http_client, &url, outbound, &state.retry_config()).await?;

    let options = RelayOptions {
        mode,
        proxy_route: state.config.proxy_reference_base(),
        stream_binary: state.config.stream_binary,
        body_timeout: state.config.upstream_timeout,
        shutdown: state.shutdown.clone(),
        tasks: state.relay_tasks.clone(),
    };

    relay(upstream, &url, &options).await
}

/// CORS preflight for browser players
pub async fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, OPTIONS"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Range, If-Range, If-None-Match, If-Modified-Since"),
            ),
            (
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static("86400"),
            ),
        ],
    )
        .into_response()
}
