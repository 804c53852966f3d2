//! Reference token codec.
//!
//! Tokens hide upstream URLs from casual inspection of the query string. They
//! are obfuscation only: anyone holding a token can recover the URL.
//!
//! Two formats are accepted:
//!
//! - **Tagged** (produced by this crate): `s.<base64>` for segments, `m.<base64>`
//!   for manifests, where the manifest payload is XOR-substituted before encoding.
//!   `.` is outside both base64 alphabets, so the tag is unambiguous.
//! - **Legacy** (untagged): plain base64 of a segment URL, or base64 of the
//!   XOR-substituted manifest URL, told apart by sniffing the decoded suffix.

use crate::hls::is_segment_uri;
use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE_NO_PAD},
};
use thiserror::Error;
use url::Url;

/// Single-byte substitution key applied to manifest payloads
pub const XOR_KEY: u8 = 125;

const SEGMENT_TAG: &str = "s.";
const MANIFEST_TAG: &str = "m.";

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// What a token points at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Binary media segment; payload is the plain URL
    Segment,
    /// Anything else (typically a playlist); payload is XOR-substituted
    Manifest,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,

    #[error("token is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("decoded token is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("decoded token is not a valid URL")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Classify a token without fully decoding it.
///
/// Legacy tokens whose outer encoding cannot be decoded classify as
/// [`TokenKind::Manifest`]; the error is reported later by [`decode`].
pub fn classify(token: &str) -> TokenKind {
    let token = token.trim();
    if token.starts_with(SEGMENT_TAG) {
        return TokenKind::Segment;
    }
    if token.starts_with(MANIFEST_TAG) {
        return TokenKind::Manifest;
    }

    match outer_decode(&restore_plus(token)) {
        Ok(bytes) if is_segment_uri(&String::from_utf8_lossy(&bytes)) => TokenKind::Segment,
        _ => TokenKind::Manifest,
    }
}

/// Decode a token into the absolute upstream URL it references.
///
/// # Errors
/// Returns [`DecodeError`] if the token is empty, not decodable, or does not
/// yield an absolute `http`/`https` URL.
///
/// The result is the parsed [`Url`], so host case, default ports and dot
/// segments come back normalized.
pub fn decode(token: &str) -> Result<Url, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }

    let raw = if let Some(payload) = token.strip_prefix(SEGMENT_TAG) {
        outer_decode(payload)?
    } else if let Some(payload) = token.strip_prefix(MANIFEST_TAG) {
        xor(outer_decode(payload)?)
    } else {
        let token = restore_plus(token);
        match classify(&token) {
            TokenKind::Segment => outer_decode(&token)?,
            TokenKind::Manifest => {
                // Legacy manifest tokens may still be percent-encoded once more
                let unwrapped = urlencoding::decode(&token)
                    .map(|s| s.into_owned())
                    .unwrap_or(token);
                xor(outer_decode(&restore_plus(&unwrapped))?)
            }
        }
    };

    parse_upstream(&String::from_utf8(raw)?)
}

/// Encode a segment URL as a tagged segment token.
pub fn encode_segment(url: &str) -> String {
    format!("{}{}", SEGMENT_TAG, URL_SAFE_NO_PAD.encode(url.as_bytes()))
}

/// Encode a manifest URL as a tagged manifest token.
pub fn encode_manifest(url: &str) -> String {
    format!(
        "{}{}",
        MANIFEST_TAG,
        URL_SAFE_NO_PAD.encode(xor(url.as_bytes().to_vec()))
    )
}

/// Decode either base64 alphabet, padded or not.
fn outer_decode(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD_LENIENT
        .decode(payload)
        .or_else(|_| URL_SAFE_LENIENT.decode(payload))
}

fn xor(mut bytes: Vec<u8>) -> Vec<u8> {
    for b in &mut bytes {
        *b ^= XOR_KEY;
    }
    bytes
}

/// Form decoding turns an unescaped `+` into a space; base64 never contains spaces.
fn restore_plus(token: &str) -> String {
    token.replace(' ', "+")
}

fn parse_upstream(candidate: &str) -> Result<Url, DecodeError> {
    let url = Url::parse(candidate)?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        "http" | "https" => Err(DecodeError::InvalidUrl(url::ParseError::EmptyHost)),
        scheme => Err(DecodeError::UnsupportedScheme(scheme.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn legacy_segment_token(url: &str) -> String {
        STANDARD.encode(url)
    }

    fn legacy_manifest_token(url: &str) -> String {
        let encoded = STANDARD.encode(xor(url.as_bytes().to_vec()));
        urlencoding::encode(&encoded).into_owned()
    }

    #[test]
    fn segment_round_trip() {
        for url in [
            "http://host/path/seg001.ts",
            "https://cdn.example.com/live/720p/chunk_00042.m4s?sig=a%2Fb&exp=1",
            "https://cdn.example.com:8443/v/seg.ts",
        ] {
            let token = encode_segment(url);
            assert_eq!(classify(&token), TokenKind::Segment);
            assert_eq!(decode(&token).unwrap().as_str(), url);
        }
    }

    #[test]
    fn decode_returns_normalized_url() {
        // Round trips are exact only for URLs already in normalized form
        for (input, normalized) in [
            ("http://EXAMPLE.com/seg.ts", "http://example.com/seg.ts"),
            ("http://host:80/a/./b/../seg.ts", "http://host/a/seg.ts"),
        ] {
            assert_eq!(decode(&encode_segment(input)).unwrap().as_str(), normalized);
            assert_eq!(decode(&encode_manifest(input)).unwrap().as_str(), normalized);
        }
    }

    #[test]
    fn manifest_round_trip() {
        for url in [
            "http://host/path/playlist.m3u8",
            "https://cdn.example.com/live/master.m3u8?token=xyz",
            // Manifest URL that happens to end like a segment stays a manifest
            "https://cdn.example.com/weird/playlist.ts",
        ] {
            let token = encode_manifest(url);
            assert_eq!(classify(&token), TokenKind::Manifest);
            assert_eq!(decode(&token).unwrap().as_str(), url);
        }
    }

    #[test]
    fn tokens_are_query_safe() {
        let token = encode_segment("https://cdn.example.com/a/b/c/seg???.ts");
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        );
    }

    #[test]
    fn legacy_segment_token_sniffed() {
        let url = "http://host/path/seg.ts";
        let token = legacy_segment_token(url);
        assert_eq!(classify(&token), TokenKind::Segment);
        assert_eq!(decode(&token).unwrap().as_str(), url);
    }

    #[test]
    fn legacy_manifest_token_with_cipher() {
        let url = "http://host/path/playlist.m3u8";
        let token = legacy_manifest_token(url);
        assert_eq!(classify(&token), TokenKind::Manifest);
        assert_eq!(decode(&token).unwrap().as_str(), url);
    }

    #[test]
    fn legacy_token_without_padding() {
        let url = "http://host/a.ts";
        let token = STANDARD.encode(url);
        let trimmed = token.trim_end_matches('=');
        assert_eq!(decode(trimmed).unwrap().as_str(), url);
    }

    #[test]
    fn spaces_restored_to_plus() {
        assert_eq!(restore_plus("ab cd+e"), "ab+cd+e");
    }

    #[test]
    fn malformed_token_classifies_as_manifest_and_fails_decode() {
        assert_eq!(classify("!!!not base64!!!"), TokenKind::Manifest);
        assert!(matches!(
            decode("!!!not base64!!!"),
            Err(DecodeError::Encoding(_))
        ));
    }

    #[test]
    fn empty_token_fails() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decode("   "), Err(DecodeError::Empty)));
    }

    #[test]
    fn tagged_token_with_bad_payload_fails() {
        assert!(decode("s.%%%").is_err());
        assert!(decode("m.***").is_err());
    }

    #[test]
    fn non_url_payload_fails() {
        let token = encode_segment("not a url at all.ts");
        assert!(matches!(decode(&token), Err(DecodeError::InvalidUrl(_))));
    }

    #[test]
    fn non_http_scheme_rejected() {
        let token = encode_segment("file:///etc/passwd.ts");
        assert!(matches!(
            decode(&token),
            Err(DecodeError::UnsupportedScheme(s)) if s == "file"
        ));
        let token = encode_manifest("ftp://host/list.m3u8");
        assert!(decode(&token).is_err());
    }
}
