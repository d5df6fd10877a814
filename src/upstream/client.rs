//! Upstream fetch executor.
//!
//! # Responsibilities
//! - Own the shared outbound HTTP client
//! - Send one `UpstreamRequest` under a deadline
//! - Classify transport failures as `UpstreamUnavailable`
//!
//! # Design Decisions
//! - Redirects are never followed here; the finalizer rewrites `Location`
//!   so every hop re-enters the proxy with the same identity
//! - No automatic retries
//! - The deadline runs from the moment the request is sent. It bounds the
//!   wait for response headers and travels with the response so a body
//!   buffered for rewriting is held to it too; streamed bodies are not

use std::time::Duration;

use axum::http::{HeaderMap, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use tokio::time::Instant;

use crate::config::UpstreamConfig;
use crate::http::error::ProxyError;
use crate::observability::metrics;
use crate::upstream::builder::UpstreamRequest;

/// Response headers plus a live upstream body.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Non-canonical status text sent by the upstream, if any.
    pub reason: Option<ReasonPhrase>,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
    /// When the upstream call as a whole expires.
    pub deadline: Instant,
}

/// Performs outbound calls.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build the shared client from configuration.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs));
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Send the request and wait for response headers.
    pub async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let UpstreamRequest {
            method,
            url,
            headers,
            body,
        } = request;

        tracing::debug!(method = %method, url = %url, "Sending upstream request");

        let mut outbound = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let deadline = Instant::now() + self.timeout;
        let response = match tokio::time::timeout_at(deadline, outbound.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_upstream_error(classify(&e));
                return Err(ProxyError::UpstreamUnavailable(describe(&e)));
            }
            Err(_) => {
                metrics::record_upstream_error("timeout");
                return Err(ProxyError::UpstreamUnavailable(format!(
                    "no response within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let response: Response<reqwest::Body> = response.into();
        let (mut parts, body) = response.into_parts();

        Ok(UpstreamResponse {
            status: parts.status,
            reason: parts.extensions.remove::<ReasonPhrase>(),
            headers: parts.headers,
            body,
            deadline,
        })
    }
}

fn classify(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connect"
    } else {
        "transport"
    }
}

/// Flatten the error chain; reqwest's top-level message alone is rarely useful.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
