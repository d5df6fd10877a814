//! Response transformation.
//!
//! # Responsibilities
//! - Decide per response whether the body is HTML, a manifest, or opaque
//! - Materialize and rewrite HTML/manifest bodies
//! - Stream everything else through untouched
//!
//! # Design Decisions
//! - Dispatch is on `Content-Type`, with a path-extension fallback for
//!   manifests served as `application/octet-stream`
//! - Buffering is bounded by `rewrite.max_body_bytes`; a body that turns out
//!   larger, declared or not, downgrades to passthrough
//! - Buffering is held to the upstream deadline; a body that stalls past it
//!   is an upstream failure (502)
//! - Non-UTF-8 bodies are returned byte-for-byte rather than lossily decoded

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::Response;
use futures_util::{stream, StreamExt};
use tokio::time::Instant;
use url::Url;

use crate::config::RewriteConfig;
use crate::http::error::ProxyError;
use crate::observability::metrics;
use crate::rewrite::{self, Dialect, RewriteContext};
use crate::upstream::{Target, UpstreamResponse};

const MANIFEST_TYPES: [&str; 5] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
    "application/dash+xml",
];

const OPAQUE_TYPES: [&str; 2] = ["application/octet-stream", "binary/octet-stream"];

/// How a response body is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Manifest,
    Passthrough,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyKind::Html => "html",
            BodyKind::Manifest => "manifest",
            BodyKind::Passthrough => "passthrough",
        }
    }

    fn dialect(&self) -> Option<Dialect> {
        match self {
            BodyKind::Html => Some(Dialect::Html),
            BodyKind::Manifest => Some(Dialect::Manifest),
            BodyKind::Passthrough => None,
        }
    }
}

/// Lowercased media type without parameters.
fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

fn has_manifest_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".mpd")
}

/// Decide how to treat a response from `target`.
pub fn classify(
    method: &Method,
    status: StatusCode,
    headers: &HeaderMap,
    target: &Url,
    config: &RewriteConfig,
) -> BodyKind {
    if *method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || status == StatusCode::PARTIAL_CONTENT
    {
        return BodyKind::Passthrough;
    }

    match media_type(headers) {
        Some(mime) if mime.starts_with("text/html") => BodyKind::Html,
        Some(mime) if MANIFEST_TYPES.iter().any(|t| mime.starts_with(t)) => BodyKind::Manifest,
        Some(mime) if mime.starts_with("text/plain") && config.plain_text_as_manifest => {
            BodyKind::Manifest
        }
        Some(mime) if OPAQUE_TYPES.contains(&mime.as_str()) && has_manifest_extension(target) => {
            BodyKind::Manifest
        }
        None if has_manifest_extension(target) => BodyKind::Manifest,
        _ => BodyKind::Passthrough,
    }
}

/// A body read up to the rewrite limit.
enum Buffered {
    Complete(Bytes),
    /// Went over the limit; the chunks read so far followed by the rest.
    Overflow(Body),
}

/// Read `body` into memory unless it grows past `limit` bytes.
async fn buffer_body(body: reqwest::Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut rest = Body::new(body).into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0;

    while let Some(chunk) = rest.next().await {
        let chunk = chunk?;
        len += chunk.len();
        chunks.push(chunk);
        if len > limit {
            let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(Buffered::Overflow(Body::from_stream(head.chain(rest))));
        }
    }

    Ok(Buffered::Complete(match chunks.len() {
        1 => chunks.remove(0),
        _ => Bytes::from(chunks.concat()),
    }))
}

/// Buffer the body before the upstream deadline expires.
async fn buffer_before(
    deadline: Instant,
    body: reqwest::Body,
    limit: usize,
) -> Result<Buffered, ProxyError> {
    match tokio::time::timeout_at(deadline, buffer_body(body, limit)).await {
        Ok(Ok(buffered)) => Ok(buffered),
        Ok(Err(e)) => {
            metrics::record_upstream_error("body");
            Err(ProxyError::UpstreamUnavailable(format!("reading upstream body: {}", e)))
        }
        Err(_) => {
            metrics::record_upstream_error("timeout");
            Err(ProxyError::UpstreamUnavailable(
                "upstream body not complete before the deadline".to_string(),
            ))
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Turn the upstream response into the client response body.
///
/// Status, reason phrase and headers are carried over; the finalizer adjusts
/// headers afterwards.
pub async fn transform_response(
    method: &Method,
    upstream: UpstreamResponse,
    target: &Target,
    proxy_origin: &str,
    config: &RewriteConfig,
) -> Result<(BodyKind, Response), ProxyError> {
    let UpstreamResponse {
        status,
        reason,
        mut headers,
        body,
        deadline,
    } = upstream;

    let mut kind = classify(method, status, &headers, target.url(), config);
    if kind != BodyKind::Passthrough {
        if let Some(length) = declared_length(&headers) {
            if length > config.max_body_bytes as u64 {
                tracing::debug!(
                    target_url = %target.url(),
                    length,
                    limit = config.max_body_bytes,
                    "Body too large to rewrite, streaming instead"
                );
                kind = BodyKind::Passthrough;
            }
        }
    }

    let body = match kind.dialect() {
        None => Body::new(body),
        Some(dialect) => match buffer_before(deadline, body, config.max_body_bytes).await? {
            Buffered::Overflow(body) => {
                tracing::debug!(
                    target_url = %target.url(),
                    limit = config.max_body_bytes,
                    "Body grew too large to rewrite, streaming instead"
                );
                kind = BodyKind::Passthrough;
                body
            }
            Buffered::Complete(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    let ctx = RewriteContext::new(target.url().clone(), proxy_origin)
                        .with_same_host_wrapping(config.wrap_same_host)
                        .with_media_extensions(&config.media_extensions);
                    let outcome = rewrite::rewrite(text, &ctx, dialect);

                    for failure in &outcome.failures {
                        tracing::debug!(
                            dialect = dialect.as_str(),
                            reference = %failure.reference,
                            error = %failure.reason,
                            "Reference left unrewritten"
                        );
                    }
                    metrics::record_rewrite_failures(dialect.as_str(), outcome.failures.len());
                    tracing::debug!(
                        dialect = dialect.as_str(),
                        rewritten = outcome.rewritten,
                        "Rewrote response body"
                    );

                    headers.remove(header::CONTENT_LENGTH);
                    headers.remove(header::ETAG);
                    headers.remove("content-md5");
                    Body::from(outcome.text)
                }
                Err(_) => {
                    tracing::debug!(target_url = %target.url(), "Body is not UTF-8, returned unchanged");
                    Body::from(bytes)
                }
            },
        },
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    if let Some(reason) = reason {
        response.extensions_mut().insert(reason);
    }
    Ok((kind, response))
}
