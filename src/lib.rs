//! Rewriting reverse proxy library.
//!
//! A client asks for `/?url=<target>`; the proxy fetches the target with a
//! browser-like identity and rewrites every link, media segment and redirect
//! in the response so it routes back through the proxy.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod rewrite;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
