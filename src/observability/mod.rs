//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handling produces:
//!     → logging.rs (subscriber setup, structured log events)
//!     → spans.rs (one span per HTTP request, carrying the request ID)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape, when enabled)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request via its span
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
pub mod spans;
