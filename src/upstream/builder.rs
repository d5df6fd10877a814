//! Outbound request construction.
//!
//! # Responsibilities
//! - Present a browser-like identity to the upstream
//! - Forward only the inbound headers the upstream actually needs
//! - Forward request bodies as an opaque stream
//!
//! # Design Decisions
//! - Outbound headers start empty; client headers such as `Host`,
//!   `X-Forwarded-For` or `CF-Connecting-IP` are never copied
//! - `Range`/`If-Range` are copied byte-for-byte for partial content
//! - Bodies are never buffered here, so binary payloads survive untouched

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::IdentityProfile;
use crate::http::request::ProxyRequest;
use crate::upstream::target::Target;

/// Inbound headers copied verbatim when present.
const FORWARDED_HEADERS: [HeaderName; 3] = [header::COOKIE, header::RANGE, header::IF_RANGE];

/// Inbound headers copied only together with a forwarded body.
const BODY_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::CONTENT_LENGTH];

/// The identity presented to one upstream for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamIdentity {
    pub user_agent: String,
    pub referer: String,
    pub origin: String,
    pub accept: String,
    pub accept_language: String,
    pub extra_headers: Vec<(String, String)>,
}

impl UpstreamIdentity {
    /// Combine the configured profile with a target.
    ///
    /// Referer and Origin default to the target's base domain.
    pub fn for_target(profile: &IdentityProfile, target: &Target) -> Self {
        Self {
            user_agent: profile.user_agent.clone(),
            referer: profile
                .referer
                .clone()
                .unwrap_or_else(|| target.base_domain().to_string()),
            origin: profile
                .origin
                .clone()
                .unwrap_or_else(|| target.base_domain().to_string()),
            accept: profile.accept.clone(),
            accept_language: profile.accept_language.clone(),
            extra_headers: profile
                .extra_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Render the identity as a header map.
    ///
    /// Values that are not valid header values are skipped; config validation
    /// rejects them before the server starts.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let core = [
            (header::USER_AGENT, &self.user_agent),
            (header::ACCEPT, &self.accept),
            (header::ACCEPT_LANGUAGE, &self.accept_language),
            (header::REFERER, &self.referer),
            (header::ORIGIN, &self.origin),
        ];
        for (name, value) in core {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }
        for (name, value) in &self.extra_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }
}

/// A fully described outbound request. Nothing has been sent yet.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Body>,
}

/// Methods whose requests never carry a forwarded body.
pub fn is_bodyless(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Build the outbound request for a proxied client request.
pub fn build_upstream_request(request: ProxyRequest, identity: &UpstreamIdentity) -> UpstreamRequest {
    let (method, target, inbound, body) = request.into_upstream_parts();

    let mut headers = identity.to_headers();
    copy_first(&inbound, &mut headers, &FORWARDED_HEADERS);

    let body = if is_bodyless(&method) {
        None
    } else {
        copy_first(&inbound, &mut headers, &BODY_HEADERS);
        body
    };

    UpstreamRequest {
        method,
        url: target.url().clone(),
        headers,
        body,
    }
}

fn copy_first(from: &HeaderMap, to: &mut HeaderMap, names: &[HeaderName]) {
    for name in names {
        if let Some(value) = from.get(name) {
            to.insert(name.clone(), value.clone());
        }
    }
}
