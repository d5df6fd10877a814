//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, upstream errors, rewrite failures)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, body kind
//! - `proxy_request_duration_seconds` (histogram): latency until headers are sent
//! - `proxy_upstream_errors_total` (counter): failed upstream calls by reason
//! - `proxy_rewrite_failures_total` (counter): references left unrewritten
//!
//! # Design Decisions
//! - Without an installed recorder every call here is a no-op, so tests
//!   and metrics-disabled deployments pay nothing

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished request.
pub fn record_request(method: &str, status: u16, kind: &'static str, start: Instant) {
    ::metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "kind" => kind
    )
    .increment(1);
    ::metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "kind" => kind
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a failed upstream call (`connect`, `timeout`, `transport`, `body`).
pub fn record_upstream_error(reason: &'static str) {
    ::metrics::counter!("proxy_upstream_errors_total", "reason" => reason).increment(1);
}

/// Record references a rewrite pass had to leave in place.
pub fn record_rewrite_failures(dialect: &'static str, count: usize) {
    if count > 0 {
        ::metrics::counter!("proxy_rewrite_failures_total", "dialect" => dialect)
            .increment(count as u64);
    }
}
