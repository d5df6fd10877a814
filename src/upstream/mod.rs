//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! ?url=<target>
//!     → target.rs (decode, validate, derive base domain)
//!     → builder.rs (identity headers, Cookie/Range, opaque body)
//!     → client.rs (send under deadline, no redirects, classify failures)
//!     → UpstreamResponse (headers + live body)
//! ```

pub mod builder;
pub mod client;
pub mod target;

pub use builder::{build_upstream_request, UpstreamIdentity, UpstreamRequest};
pub use client::{UpstreamClient, UpstreamResponse};
pub use target::{resolve_target, target_param, Target};
