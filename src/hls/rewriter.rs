use crate::hls::is_segment_uri;
use crate::token;
use tracing::debug;
use url::Url;

/// How segment references in a manifest are rewritten
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteMode {
    /// Segments point straight at the origin
    Direct,
    /// Segments are re-encoded as tokens routed back through this proxy
    Proxied,
}

impl RewriteMode {
    /// Map the `dd` query flag: `"1"` selects direct mode, anything else proxied.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some("1") => Self::Direct,
            _ => Self::Proxied,
        }
    }
}

/// A fetched manifest together with the URL it was fetched from
#[derive(Debug)]
pub struct ManifestDocument<'a> {
    text: &'a str,
    base_url: &'a Url,
    /// Base URL without query, up to and including the final `/`
    base_path: String,
}

impl<'a> ManifestDocument<'a> {
    pub fn new(text: &'a str, base_url: &'a Url) -> Self {
        let mut stripped = base_url.clone();
        stripped.set_query(None);
        stripped.set_fragment(None);
        let full = stripped.as_str();
        let base_path = match full.rfind('/') {
            Some(idx) => full[..=idx].to_string(),
            None => format!("{full}/"),
        };

        Self {
            text,
            base_url,
            base_path,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Resolve a segment reference to an absolute URL string.
    ///
    /// Plain relative references are concatenated onto [`Self::base_path`]
    /// without normalisation.
    pub fn resolve(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else if reference.starts_with("//") {
            format!("{}:{}", self.base_url.scheme(), reference)
        } else if reference.starts_with('/') {
            format!("{}{}", self.base_url.origin().ascii_serialization(), reference)
        } else {
            format!("{}{}", self.base_path, reference)
        }
    }

    /// Rewrite every segment line of the manifest.
    ///
    /// `proxy_route` is the prefix for proxied references, e.g. `/pp`.
    /// Non-segment lines, tag lines and line terminators are copied verbatim.
    pub fn rewrite(&self, mode: RewriteMode, proxy_route: &str) -> String {
        let mut output = String::with_capacity(self.text.len() + self.text.len() / 2);
        let mut rewritten = 0usize;

        for line in self.text.split_inclusive('\n') {
            let content = line.trim_end();
            let reference = content.trim_start();

            if reference.is_empty() || reference.starts_with('#') || !is_segment_uri(reference) {
                output.push_str(line);
                continue;
            }

            let leading = &content[..content.len() - reference.len()];
            let trailing = &line[content.len()..];

            let resolved = self.resolve(reference);
            output.push_str(leading);
            match mode {
                RewriteMode::Direct => output.push_str(&resolved),
                RewriteMode::Proxied => output.push_str(&proxy_reference(proxy_route, &resolved)),
            }
            output.push_str(trailing);
            rewritten += 1;
        }

        debug!(
            "Rewrote {} segment references ({:?} mode)",
            rewritten, mode
        );
        output
    }
}

/// Build a proxy-route reference carrying a fresh segment token.
pub fn proxy_reference(proxy_route: &str, segment_url: &str) -> String {
    format!(
        "{}?jj={}",
        proxy_route,
        urlencoding::encode(&token::encode_segment(segment_url))
    )
}
