//! Response relay: turn an upstream response into the client response.
//!
//! Manifests are buffered, rewritten and sent as text. Everything else is
//! relayed as binary, streamed through a bounded channel by a spawned task so
//! that a client disconnect stops the upstream read.

use crate::{
    error::{ProxyError, Result},
    hls::{self, HLS_CONTENT_TYPE, rewriter::{ManifestDocument, RewriteMode}},
    metrics,
};
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};
use url::Url;

/// Chunks buffered between the upstream reader and the client writer
pub const RELAY_BUFFER_CHUNKS: usize = 16;

/// Upstream headers copied onto binary responses
pub const FORWARDED_BINARY_HEADERS: [HeaderName; 8] = [
    header::CONTENT_TYPE,
    header::CONTENT_RANGE,
    header::CONTENT_LENGTH,
    header::ACCEPT_RANGES,
    header::CACHE_CONTROL,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CONTENT_ENCODING,
];

/// Per-request relay settings
#[derive(Clone, Debug)]
pub struct RelayOptions {
    pub mode: RewriteMode,
    /// Prefix for proxied segment references, e.g. `/pp`
    pub proxy_route: String,
    /// Stream binary bodies; when `false` they are buffered in memory
    pub stream_binary: bool,
    /// Wall-clock bound for reading a buffered body
    pub body_timeout: Duration,
    /// Cancelled on server shutdown
    pub shutdown: CancellationToken,
    /// Tracks spawned relay tasks so shutdown can wait for them
    pub tasks: TaskTracker,
}

/// Returns `true` if the response should go through the manifest rewriter.
pub fn is_manifest(resolved: &Url, content_type: Option<&str>) -> bool {
    hls::is_manifest_path(resolved.path())
        || content_type.is_some_and(hls::is_manifest_content_type)
}

/// Relay an upstream response to the client.
///
/// # Errors
/// - [`ProxyError::UpstreamClientError`] for upstream `403`/`404`
/// - [`ProxyError::UpstreamFailure`] if a buffered body cannot be read
/// - [`ProxyError::UpstreamTimeout`] if a buffered body stalls past `body_timeout`
pub async fn relay(upstream: reqwest::Response, resolved: &Url, options: &RelayOptions) -> Result<Response> {
    let status = upstream.status();
    if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND {
        return Err(ProxyError::UpstreamClientError(status));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Only a complete manifest is rewritten; 206 and other statuses pass through as binary
    if status == StatusCode::OK && is_manifest(resolved, content_type.as_deref()) {
        relay_manifest(upstream, resolved, content_type, options).await
    } else {
        relay_binary(upstream, options).await
    }
}

async fn relay_manifest(
    upstream: reqwest::Response,
    resolved: &Url,
    content_type: Option<String>,
    options: &RelayOptions,
) -> Result<Response> {
    let cache_control = upstream.headers().get(header::CACHE_CONTROL).cloned();
    let text = read_body(options.body_timeout, upstream.text()).await?;

    let rewritten = ManifestDocument::new(&text, resolved).rewrite(options.mode, &options.proxy_route);
    info!(
        "Manifest rewritten: {} -> {} bytes ({:?} mode)",
        text.len(),
        rewritten.len(),
        options.mode
    );

    let mut headers = HeaderMap::new();
    let content_type = content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(HLS_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    if let Some(cache_control) = cache_control {
        headers.insert(header::CACHE_CONTROL, cache_control);
    }

    Ok((StatusCode::OK, headers, rewritten).into_response())
}

async fn relay_binary(upstream: reqwest::Response, options: &RelayOptions) -> Result<Response> {
    let status = upstream.status();

    let mut headers = HeaderMap::new();
    for name in FORWARDED_BINARY_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );

    let body = if options.stream_binary {
        spawn_stream_relay(upstream, options)
    } else {
        let bytes = read_body(options.body_timeout, upstream.bytes()).await?;
        debug!("Buffered binary body: {} bytes", bytes.len());
        Body::from(bytes)
    };

    Ok((status, headers, body).into_response())
}

/// Await a buffered body read, failing with [`ProxyError::UpstreamTimeout`] once `limit` elapses.
async fn read_body<T>(
    limit: Duration,
    read: impl Future<Output = reqwest::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, read).await {
        Ok(body) => Ok(body?),
        Err(_) => {
            warn!("Upstream body stalled for {}ms", limit.as_millis());
            Err(ProxyError::UpstreamTimeout)
        }
    }
}

/// Spawn the task that copies the upstream body into a bounded channel.
///
/// The task stops, dropping the upstream response and its connection, when
/// the client side of the channel is dropped or the server shuts down.
fn spawn_stream_relay(upstream: reqwest::Response, options: &RelayOptions) -> Body {
    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(RELAY_BUFFER_CHUNKS);
    let shutdown = options.shutdown.clone();

    options.tasks.spawn(async move {
        let mut stream = upstream.bytes_stream();
        let mut relayed: u64 = 0;

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    debug!("Client went away after {} bytes, cancelling upstream read", relayed);
                    metrics::record_relay_cancelled("client_disconnect");
                    break;
                }
                _ = shutdown.cancelled() => {
                    debug!("Shutdown during relay after {} bytes", relayed);
                    metrics::record_relay_cancelled("shutdown");
                    break;
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        relayed += bytes.len() as u64;
                        // A slow client can leave the channel full; keep honouring shutdown
                        tokio::select! {
                            sent = tx.send(Ok(bytes)) => {
                                if sent.is_err() {
                                    metrics::record_relay_cancelled("client_disconnect");
                                    break;
                                }
                            }
                            _ = shutdown.cancelled() => {
                                metrics::record_relay_cancelled("shutdown");
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Upstream body error after {} bytes: {}", relayed, e.without_url());
                        let _ = tx.send(Err(std::io::Error::other("upstream body error"))).await;
                        break;
                    }
                    None => {
                        debug!("Relayed {} bytes", relayed);
                        break;
                    }
                },
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
