//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → request.rs (request ID, proxy origin, ProxyRequest)
//!     → [upstream: resolve target, build, fetch]
//!     → transform.rs (HTML / manifest rewrite, or streaming passthrough)
//!     → response.rs (CORS, header stripping, Location rewrite)
//!     → Send to client
//! ```
//!
//! Failures at any step become a `ProxyError` (error.rs) and a JSON response.

pub mod error;
pub mod request;
pub mod response;
pub mod server;
pub mod transform;

pub use error::ProxyError;
pub use request::{ProxyRequest, X_REQUEST_ID};
pub use server::HttpServer;
