use crate::error::ProxyError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Check that a decoded upstream URL may be fetched.
///
/// Only `http://` and `https://` URLs with a host are accepted. When
/// `block_private` is set, IP-literal hosts in loopback, private or
/// link-local ranges are rejected too.
///
/// **Hostnames** are accepted without DNS resolution; a hostname that
/// resolves to a private address is not caught here.
///
/// # Errors
/// Returns [`ProxyError::InvalidUpstream`] for:
/// - Non-HTTP(S) schemes or a missing host
/// - IPv4 addresses in private/reserved ranges (when blocking)
/// - IPv6 loopback or link-local/unique-local addresses (when blocking)
pub fn validate_upstream_url(url: &Url, block_private: bool) -> Result<(), ProxyError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProxyError::InvalidUpstream(format!(
                "scheme '{scheme}' not allowed"
            )));
        }
    }

    let host = url
        .host()
        .ok_or_else(|| ProxyError::InvalidUpstream("no host in URL".to_string()))?;

    if !block_private {
        return Ok(());
    }

    match host {
        Host::Ipv4(ip) if is_blocked_ipv4(ip) => Err(ProxyError::InvalidUpstream(format!(
            "private or reserved IPv4 address {ip}"
        ))),
        Host::Ipv6(ip) if is_blocked_ipv6(ip) => Err(ProxyError::InvalidUpstream(format!(
            "private or reserved IPv6 address {ip}"
        ))),
        // Hostnames are allowed — we cannot resolve them without async DNS
        _ => Ok(()),
    }
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`      — "this" network (RFC 1122)
/// - `10.0.0.0/8`     — RFC 1918 private
/// - `127.0.0.0/8`    — loopback
/// - `169.254.0.0/16` — link-local / cloud-metadata (AWS, GCP, Azure)
/// - `172.16.0.0/12`  — RFC 1918 private
/// - `192.168.0.0/16` — RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    let (a, b) = (octets[0], octets[1]);

    a == 0                               // 0.0.0.0/8
        || a == 10                       // 10.0.0.0/8
        || a == 127                      // 127.0.0.0/8 loopback
        || (a == 169 && b == 254)        // 169.254.0.0/16 link-local
        || (a == 172 && (16..=31).contains(&b)) // 172.16.0.0/12
        || (a == 192 && b == 168) // 192.168.0.0/16
}

/// Returns `true` for IPv6 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `::1/128`     — loopback
/// - `fe80::/10`   — link-local
/// - `fc00::/7`    — unique-local (ULA)
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();

    ip.is_loopback()                     // ::1
        || (s[0] & 0xffc0) == 0xfe80    // fe80::/10 link-local
        || (s[0] & 0xfe00) == 0xfc00 // fc00::/7 unique-local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(url: &str) -> bool {
        validate_upstream_url(&Url::parse(url).unwrap(), true).is_err()
    }

    fn allowed_when_open(url: &str) -> bool {
        validate_upstream_url(&Url::parse(url).unwrap(), false).is_ok()
    }

    // --- IPv4 private ranges ---

    #[test]
    fn rejects_loopback_and_rfc1918() {
        assert!(blocked("http://127.0.0.1/seg.ts"));
        assert!(blocked("http://10.255.255.255/seg.ts"));
        assert!(blocked("http://172.16.0.1/seg.ts"));
        assert!(blocked("http://172.31.255.255/seg.ts"));
        assert!(blocked("http://192.168.1.10/live/index.m3u8"));
        assert!(blocked("http://0.1.2.3/seg.ts"));
    }

    #[test]
    fn rejects_link_local_metadata() {
        assert!(blocked("http://169.254.169.254/latest/meta-data/"));
    }

    // --- IPv6 private ranges ---

    #[test]
    fn rejects_private_ipv6() {
        assert!(blocked("http://[::1]/seg.ts"));
        assert!(blocked("http://[fe80::1]/seg.ts"));
        assert!(blocked("http://[fd00::1]/seg.ts"));
    }

    // --- Public addresses allowed ---

    #[test]
    fn allows_public_hosts() {
        assert!(!blocked("http://1.2.3.4/seg.ts"));
        assert!(!blocked("https://cdn.example.com/live/index.m3u8?token=abc"));
        assert!(!blocked("http://[2001:db8::1]/seg.ts"));
    }

    // --- Range boundary tests ---

    #[test]
    fn boundary_172_ranges_not_blocked() {
        assert!(!blocked("http://172.15.255.255/seg.ts"));
        assert!(!blocked("http://172.32.0.0/seg.ts"));
    }

    // --- Guard disabled ---

    #[test]
    fn private_hosts_allowed_when_guard_off() {
        assert!(allowed_when_open("http://127.0.0.1:8080/seg.ts"));
        assert!(allowed_when_open("http://10.0.0.5/live/index.m3u8"));
    }

    // --- Scheme validation ---

    #[test]
    fn rejects_non_http_schemes_regardless_of_guard() {
        assert!(!allowed_when_open("ftp://cdn.example.com/file.ts"));
        assert!(!allowed_when_open("file:///etc/passwd"));
        assert!(blocked("gopher://cdn.example.com/stream"));
    }
}
