use crate::{http_retry::FetchError, token::DecodeError};
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the proxy endpoint.
///
/// Every variant maps to a plain-text response; upstream URLs never appear in
/// the message.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing 'jj' parameter")]
    MissingToken,

    #[error("Invalid 'jj' parameter: {0}")]
    InvalidToken(#[from] DecodeError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Upstream not allowed: {0}")]
    InvalidUpstream(String),

    #[error("Upstream timed out")]
    UpstreamTimeout,

    #[error("Proxy error: {0}")]
    UpstreamFailure(String),

    #[error("Upstream responded with {0}")]
    UpstreamClientError(StatusCode),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status returned to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidToken(_)
            | Self::InvalidQuery(_)
            | Self::InvalidUpstream(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamClientError(status) => *status,
        }
    }
}

impl From<FetchError> for ProxyError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout { .. } => Self::UpstreamTimeout,
            other => Self::UpstreamFailure(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::UpstreamTimeout;
        }
        Self::UpstreamFailure(e.without_url().to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!("Request failed ({}): {}", status.as_u16(), message);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), message);
        }

        (
            status,
            [
                (
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                ),
                (
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                ),
            ],
            message,
        )
            .into_response()
    }
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
