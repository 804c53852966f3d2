use crate::browser_headers::BrowserProfile;
use std::env;
use std::time::Duration;

/// Default route the proxy endpoint is mounted on
pub const DEFAULT_PROXY_ROUTE: &str = "/pp";

/// Default per-attempt upstream timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

/// Default number of additional upstream attempts after the first one
pub const DEFAULT_UPSTREAM_MAX_RETRIES: u32 = 2;

/// Default backoff step in milliseconds (delay grows linearly per attempt)
pub const DEFAULT_UPSTREAM_BACKOFF_MS: u64 = 500;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Route the proxy endpoint is mounted on; also used in rewritten manifests
    pub proxy_route: String,
    /// Optional absolute prefix for rewritten proxy references (empty = relative)
    pub public_base_url: String,
    /// Wall-clock bound for a single upstream attempt
    pub upstream_timeout: Duration,
    /// Additional attempts after the first one
    pub upstream_max_retries: u32,
    /// Backoff step, multiplied by the attempt index
    pub upstream_backoff: Duration,
    /// Stream binary bodies through a relay task instead of buffering them
    pub stream_binary: bool,
    /// Reject tokens that resolve to loopback/private IP literals
    pub block_private_upstreams: bool,
    /// Fallback request headers used when the client does not send its own
    pub browser: BrowserProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            proxy_route: DEFAULT_PROXY_ROUTE.to_string(),
            public_base_url: String::new(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            upstream_max_retries: DEFAULT_UPSTREAM_MAX_RETRIES,
            upstream_backoff: Duration::from_millis(DEFAULT_UPSTREAM_BACKOFF_MS),
            stream_binary: true,
            block_private_upstreams: false,
            browser: BrowserProfile::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional. Malformed numeric tuning values fall back to
    /// their defaults; a malformed `PORT` or `PROXY_ROUTE` is an error.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Config::default();

        let port = match env::var("PORT") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.port,
        };

        let proxy_route = env::var("PROXY_ROUTE").unwrap_or(defaults.proxy_route);
        if !proxy_route.starts_with('/') {
            return Err(format!("PROXY_ROUTE must start with '/': {proxy_route}").into());
        }

        // Trailing slash would produce "//pp" when joined with the route
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_base_url);

        let upstream_timeout = env::var("UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.upstream_timeout);

        let upstream_max_retries = env::var("UPSTREAM_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.upstream_max_retries);

        let upstream_backoff = env::var("UPSTREAM_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.upstream_backoff);

        let stream_binary = env_flag("STREAM_BINARY").unwrap_or(defaults.stream_binary);
        let block_private_upstreams =
            env_flag("BLOCK_PRIVATE_UPSTREAMS").unwrap_or(defaults.block_private_upstreams);

        let mut browser = defaults.browser;
        if let Ok(ua) = env::var("FALLBACK_USER_AGENT") {
            browser.user_agent = ua;
        }
        if let Ok(accept) = env::var("FALLBACK_ACCEPT") {
            browser.accept = accept;
        }
        if let Ok(lang) = env::var("FALLBACK_ACCEPT_LANGUAGE") {
            browser.accept_language = lang;
        }

        Ok(Config {
            port,
            proxy_route,
            public_base_url,
            upstream_timeout,
            upstream_max_retries,
            upstream_backoff,
            stream_binary,
            block_private_upstreams,
            browser,
        })
    }

    /// Prefix used for proxy references written into manifests
    pub fn proxy_reference_base(&self) -> String {
        format!("{}{}", self.public_base_url, self.proxy_route)
    }
}

/// Parse a boolean env var; unrecognised values are treated as unset.
fn env_flag(name: &str) -> Option<bool> {
    match env::var(name).ok()?.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all env-var tests to prevent races between parallel test threads.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "PORT",
        "PROXY_ROUTE",
        "PUBLIC_BASE_URL",
        "UPSTREAM_TIMEOUT_SECS",
        "UPSTREAM_MAX_RETRIES",
        "UPSTREAM_BACKOFF_MS",
        "STREAM_BINARY",
        "BLOCK_PRIVATE_UPSTREAMS",
        "FALLBACK_USER_AGENT",
        "FALLBACK_ACCEPT",
        "FALLBACK_ACCEPT_LANGUAGE",
    ];

    /// Clear every config var, set `set`, run `f`, then restore original state.
    fn with_env(set: &[(&str, &str)], f: impl FnOnce()) {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());

        let saved: Vec<(&str, Option<String>)> =
            ALL_VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for k in ALL_VARS {
            // SAFETY: serialized by ENV_LOCK — no other thread modifies env vars concurrently.
            unsafe { std::env::remove_var(k) };
        }
        for (k, v) in set {
            unsafe { std::env::set_var(k, v) };
        }

        f();

        for (k, old) in saved {
            match old {
                Some(v) => unsafe { std::env::set_var(k, v) },
                None => unsafe { std::env::remove_var(k) },
            }
        }
    }

    #[test]
    fn defaults_when_nothing_set() {
        with_env(&[], || {
            let config = Config::from_env().expect("defaults should load");
            assert_eq!(config.port, 3000);
            assert_eq!(config.proxy_route, "/pp");
            assert_eq!(config.public_base_url, "");
            assert_eq!(config.upstream_timeout, Duration::from_secs(15));
            assert_eq!(config.upstream_max_retries, 2);
            assert_eq!(config.upstream_backoff, Duration::from_millis(500));
            assert!(config.stream_binary);
            assert!(!config.block_private_upstreams);
            assert_eq!(config.proxy_reference_base(), "/pp");
        });
    }

    #[test]
    fn invalid_port_is_an_error() {
        with_env(&[("PORT", "not-a-port")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn route_must_be_absolute_path() {
        with_env(&[("PROXY_ROUTE", "pp")], || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn public_base_url_trailing_slash_trimmed() {
        with_env(
            &[
                ("PUBLIC_BASE_URL", "https://proxy.example.com/"),
                ("PROXY_ROUTE", "/stream"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(
                    config.proxy_reference_base(),
                    "https://proxy.example.com/stream"
                );
            },
        );
    }

    #[test]
    fn upstream_tuning_parsed() {
        with_env(
            &[
                ("UPSTREAM_TIMEOUT_SECS", "5"),
                ("UPSTREAM_MAX_RETRIES", "4"),
                ("UPSTREAM_BACKOFF_MS", "250"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.upstream_timeout, Duration::from_secs(5));
                assert_eq!(config.upstream_max_retries, 4);
                assert_eq!(config.upstream_backoff, Duration::from_millis(250));
            },
        );
    }

    #[test]
    fn malformed_tuning_falls_back_to_defaults() {
        with_env(
            &[
                ("UPSTREAM_TIMEOUT_SECS", "0"),
                ("UPSTREAM_MAX_RETRIES", "lots"),
                ("STREAM_BINARY", "maybe"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.upstream_timeout, Duration::from_secs(15));
                assert_eq!(config.upstream_max_retries, 2);
                assert!(config.stream_binary);
            },
        );
    }

    #[test]
    fn boolean_flags_parsed() {
        with_env(
            &[("STREAM_BINARY", "false"), ("BLOCK_PRIVATE_UPSTREAMS", "1")],
            || {
                let config = Config::from_env().unwrap();
                assert!(!config.stream_binary);
                assert!(config.block_private_upstreams);
            },
        );
    }

    #[test]
    fn browser_fallbacks_overridable() {
        with_env(&[("FALLBACK_USER_AGENT", "TestAgent/1.0")], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.browser.user_agent, "TestAgent/1.0");
            assert_eq!(
                config.browser.accept_language,
                BrowserProfile::default().accept_language
            );
        });
    }
}
