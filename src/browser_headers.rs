//! Outbound request headers that make upstream fetches look like a browser.
//!
//! This is a policy table: each header is either forwarded from the client,
//! filled from a [`BrowserProfile`] default, or derived from the target URL.

use crate::hls::is_manifest_path;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use url::Url;

/// Client headers copied verbatim when present
pub const FORWARDED_HEADERS: [HeaderName; 5] = [
    header::RANGE,
    header::IF_RANGE,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
    header::COOKIE,
];

/// Fallback values used when the client sends no header of its own
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for BrowserProfile {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            accept: "*/*".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

/// Build the header set for an upstream request.
///
/// * `client` — headers of the inbound request
/// * `target` — resolved upstream URL
/// * `referer_override` — `ref` query parameter, wins over the derived referer
pub fn upstream_headers(
    client: &HeaderMap,
    target: &Url,
    referer_override: Option<&str>,
    profile: &BrowserProfile,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    forward_or_default(client, &mut headers, header::USER_AGENT, &profile.user_agent);
    forward_or_default(client, &mut headers, header::ACCEPT, &profile.accept);
    forward_or_default(
        client,
        &mut headers,
        header::ACCEPT_LANGUAGE,
        &profile.accept_language,
    );

    let referer = referer_override
        .filter(|r| !r.trim().is_empty())
        .and_then(|r| HeaderValue::from_str(r.trim()).ok())
        .or_else(|| HeaderValue::from_str(&format!("{}/", target.origin().ascii_serialization())).ok());
    if let Some(referer) = referer {
        headers.insert(header::REFERER, referer);
    }

    for name in FORWARDED_HEADERS {
        if let Some(value) = client.get(&name) {
            headers.insert(name, value.clone());
        }
    }

    // Manifests are rewritten as text, so they must arrive uncompressed
    let encoding = match client.get(header::ACCEPT_ENCODING) {
        Some(value) if !is_manifest_path(target.path()) => value.clone(),
        _ => HeaderValue::from_static("identity"),
    };
    headers.insert(header::ACCEPT_ENCODING, encoding);

    headers
}

fn forward_or_default(client: &HeaderMap, out: &mut HeaderMap, name: HeaderName, default: &str) {
    if let Some(value) = client.get(&name) {
        out.insert(name, value.clone());
    } else if let Ok(value) = HeaderValue::from_str(default) {
        out.insert(name, value);
    }
}
