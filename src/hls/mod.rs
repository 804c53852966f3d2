//! HLS vocabulary shared by the token codec, the rewriter and the relay.

pub mod rewriter;

/// Content-Type used for rewritten manifests when the origin sends none
pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// File extensions treated as binary media segments (lowercase, with dot)
pub const SEGMENT_EXTENSIONS: &[&str] = &[
    ".ts", ".m4s", ".mp4", ".m4a", ".m4v", ".aac", ".mp3", ".ac3", ".ec3", ".cmfv", ".cmfa",
];

/// File extensions treated as playlist manifests
pub const MANIFEST_EXTENSIONS: &[&str] = &[".m3u8", ".m3u"];

/// Strip an optional `?query` and `#fragment` from a URI reference.
fn strip_query(reference: &str) -> &str {
    reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
}

fn ends_with_any(path: &str, extensions: &[&str]) -> bool {
    let path = path.to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

/// Returns `true` if the reference names a binary segment, ignoring any query string.
pub fn is_segment_uri(reference: &str) -> bool {
    ends_with_any(strip_query(reference.trim_end()), SEGMENT_EXTENSIONS)
}

/// Returns `true` if the URL path names a playlist manifest.
pub fn is_manifest_path(path: &str) -> bool {
    ends_with_any(strip_query(path), MANIFEST_EXTENSIONS)
}

/// Returns `true` if a Content-Type header value denotes an HLS playlist.
///
/// Matches `application/vnd.apple.mpegurl`, `application/x-mpegurl` and
/// `audio/mpegurl` variants.
pub fn is_manifest_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
}
