//! Request-level error taxonomy.
//!
//! Every fatal error of a proxied request ends up here and is turned into a
//! short JSON response. Per-token rewrite failures are not errors at this
//! level; see [`crate::rewrite::RewriteFailure`].

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No `url` query parameter.
    #[error("missing `url` query parameter")]
    MissingTarget,

    /// The parameter is not an absolute http(s) URL.
    #[error("invalid target URL: {0}")]
    InvalidTarget(String),

    /// Connection, DNS or timeout failure talking to the upstream.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MissingTarget => "missing_target",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        let json = serde_json::to_string(&body)
            .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", self.kind()));

        let mut response = (self.status(), json).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }
}
