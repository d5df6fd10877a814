//! Response finalization.
//!
//! # Responsibilities
//! - Add CORS headers to every response, including proxy errors
//! - Remove framing protection and hop-by-hop headers
//! - Rewrite redirect `Location` headers back through the proxy
//! - Answer preflight requests without touching the upstream
//!
//! # Design Decisions
//! - Upstream status and reason phrase are never changed here
//! - A `Location` that cannot be resolved is left as sent and logged

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use url::Url;

use crate::config::CorsConfig;
use crate::rewrite::encode_component;

/// Headers that stop the page from being framed.
const FRAMING_HEADERS: [&str; 4] = [
    "x-frame-options",
    "frame-options",
    "content-security-policy",
    "content-security-policy-report-only",
];

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    HeaderName::from_static("proxy-connection"),
    header::UPGRADE,
    header::TE,
    header::TRAILER,
];

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => tracing::warn!(header = %name, "Skipping invalid configured header value"),
    }
}

/// Set the CORS headers from configuration.
pub fn apply_cors(headers: &mut HeaderMap, cors: &CorsConfig) {
    set(headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, &cors.allow_origin);
    set(headers, header::ACCESS_CONTROL_ALLOW_METHODS, &cors.allow_methods);
    set(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, &cors.allow_headers);
    set(headers, header::ACCESS_CONTROL_EXPOSE_HEADERS, &cors.expose_headers);
}

/// Drop framing protection and connection-scoped headers.
pub fn strip_blocking_headers(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    for name in FRAMING_HEADERS {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Point a redirect back at the proxy.
///
/// Returns the new value, or `None` when the header is absent, the status is
/// not a redirect, or the value cannot be resolved.
pub fn rewrite_location(
    status: StatusCode,
    headers: &HeaderMap,
    target: &Url,
    proxy_origin: &str,
) -> Option<String> {
    if !status.is_redirection() {
        return None;
    }
    let raw = headers.get(header::LOCATION)?;
    let location = match raw.to_str() {
        Ok(v) => v.trim(),
        Err(_) => {
            tracing::debug!("Location header is not visible ASCII, left unchanged");
            return None;
        }
    };

    let resolved = match target.join(location) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            tracing::debug!(location = %url, "Non-http(s) redirect left unchanged");
            return None;
        }
        Err(e) => {
            tracing::warn!(location = %location, error = %e, "Cannot resolve redirect location");
            return None;
        }
    };

    Some(format!(
        "{}/?url={}",
        proxy_origin.trim_end_matches('/'),
        encode_component(resolved.as_str())
    ))
}

/// Apply every finalization step to a response for `target`.
pub fn finalize(response: &mut Response, target: &Url, proxy_origin: &str, cors: &CorsConfig) {
    let status = response.status();
    let headers = response.headers_mut();

    strip_blocking_headers(headers);
    if let Some(location) = rewrite_location(status, headers, target, proxy_origin) {
        set(headers, header::LOCATION, &location);
    }
    apply_cors(headers, cors);
}

/// Immediate answer to an `OPTIONS` request.
pub fn preflight_response(cors: &CorsConfig) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors(headers, cors);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(cors.max_age_secs));
    response
}
