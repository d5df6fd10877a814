//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Determine the proxy origin the client used to reach us
//! - Capture the inbound request as an immutable `ProxyRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A configured public origin always wins over request headers
//! - Duplicate inbound headers: the first occurrence wins

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::upstream::target::Target;

/// Header carrying the request correlation ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a UUID v4 request ID for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Read the request ID set by the request-id layer.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Work out `scheme://host` as seen by the client.
///
/// Order: configured public origin, then `X-Forwarded-Proto` + `Host`, then
/// the URI authority, then the listener address.
pub fn proxy_origin(
    public_origin: Option<&str>,
    headers: &HeaderMap,
    uri: &Uri,
    listen_addr: &str,
) -> String {
    if let Some(origin) = public_origin {
        return origin.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| listen_addr.to_string());

    format!("{}://{}", scheme, host)
}

/// A client request bound to a validated target.
#[derive(Debug)]
pub struct ProxyRequest {
    method: Method,
    target: Target,
    headers: HeaderMap,
    body: Option<Body>,
    proxy_origin: String,
}

impl ProxyRequest {
    pub fn new(
        method: Method,
        target: Target,
        headers: HeaderMap,
        body: Option<Body>,
        proxy_origin: String,
    ) -> Self {
        Self {
            method,
            target,
            headers,
            body,
            proxy_origin,
        }
    }

    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    /// Consume the request for the upstream builder.
    pub(crate) fn into_upstream_parts(self) -> (Method, Target, HeaderMap, Option<Body>) {
        (self.method, self.target, self.headers, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    #[test]
    fn public_origin_wins() {
        let h = headers(&[("host", "internal:8080")]);
        let origin = proxy_origin(Some("https://proxy.example/"), &h, &Uri::from_static("/"), "0.0.0.0:8080");
        assert_eq!(origin, "https://proxy.example");
    }

    #[test]
    fn uses_forwarded_proto_and_host() {
        let h = headers(&[("host", "proxy.example"), ("x-forwarded-proto", "https, http")]);
        let origin = proxy_origin(None, &h, &Uri::from_static("/?url=x"), "0.0.0.0:8080");
        assert_eq!(origin, "https://proxy.example");
    }

    #[test]
    fn ignores_bogus_forwarded_proto() {
        let h = headers(&[("host", "proxy.example:8080"), ("x-forwarded-proto", "gopher")]);
        let origin = proxy_origin(None, &h, &Uri::from_static("/"), "0.0.0.0:8080");
        assert_eq!(origin, "http://proxy.example:8080");
    }

    #[test]
    fn falls_back_to_authority_then_listener() {
        let uri = Uri::from_static("http://authority.example:81/?url=x");
        assert_eq!(
            proxy_origin(None, &HeaderMap::new(), &uri, "0.0.0.0:8080"),
            "http://authority.example:81"
        );
        assert_eq!(
            proxy_origin(None, &HeaderMap::new(), &Uri::from_static("/"), "127.0.0.1:8080"),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn request_ids_are_uuids() {
        let req = Request::builder().body(()).unwrap();
        let id = UuidRequestId.make_request_id(&req).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(text).is_ok());
    }

    #[test]
    fn request_id_defaults_to_unknown() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
