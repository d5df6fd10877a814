//! Target URL resolution.
//!
//! # Responsibilities
//! - Turn the `url` query parameter into a validated absolute http(s) URL
//! - Tolerate clients that encode the parameter one extra time
//! - Derive the base domain used as spoofed Referer/Origin
//!
//! # Design Decisions
//! - The parameter is tried as delivered first, then with exactly one extra
//!   percent-decode pass; nothing decodes more than once
//! - Only http and https are accepted; everything else is `InvalidTarget`

use percent_encoding::percent_decode_str;
use url::Url;

use crate::http::error::ProxyError;

/// A validated upstream target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    base_domain: String,
}

impl Target {
    /// The absolute upstream URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://host[:port]` of the target.
    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }
}

/// Extract the raw `url` parameter from a query string.
///
/// Returns the first occurrence after form decoding. Empty values count as
/// missing.
pub fn target_param(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

/// Resolve a raw target parameter into a [`Target`].
pub fn resolve_target(raw: &str) -> Result<Target, ProxyError> {
    let raw = raw.trim();

    let url = match parse_http_url(raw) {
        Some(url) => url,
        None => {
            let decoded = percent_decode_str(raw).decode_utf8().ok();
            decoded
                .as_deref()
                .and_then(parse_http_url)
                .ok_or_else(|| ProxyError::InvalidTarget(raw.to_string()))?
        }
    };

    Ok(Target {
        base_domain: url.origin().ascii_serialization(),
        url,
    })
}

fn parse_http_url(candidate: &str) -> Option<Url> {
    let url = Url::parse(candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url)
}
