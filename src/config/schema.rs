//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rewrite::DEFAULT_MEDIA_EXTENSIONS;

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// How the proxy names itself in rewritten URLs.
    pub proxy: PublicConfig,

    /// Outbound client settings.
    pub upstream: UpstreamConfig,

    /// Browser identity presented to upstream servers.
    pub identity: IdentityProfile,

    /// CORS headers added to every response.
    pub cors: CorsConfig,

    /// Rewriting engine settings.
    pub rewrite: RewriteConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Public naming of the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PublicConfig {
    /// Fixed origin (e.g., "https://proxy.example") used when wrapping URLs.
    ///
    /// When unset, the origin is derived per request from `X-Forwarded-Proto`
    /// and `Host`.
    pub public_origin: Option<String>,
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TCP/TLS connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Deadline for the upstream to deliver response headers, and any body
    /// buffered for rewriting, in seconds.
    pub timeout_secs: u64,

    /// Bound on the whole handler (until response headers reach the client).
    /// Must be greater than `timeout_secs`.
    pub request_timeout_secs: u64,

    /// Honor HTTP(S)_PROXY environment variables for outbound calls.
    pub use_system_proxy: bool,

    /// Idle keep-alive connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 30,
            request_timeout_secs: 60,
            use_system_proxy: true,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Browser identity profile sent to every upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityProfile {
    /// User-Agent header value.
    pub user_agent: String,

    /// Fixed Referer. Defaults to the target's base domain.
    pub referer: Option<String>,

    /// Fixed Origin. Defaults to the target's base domain.
    pub origin: Option<String>,

    /// Accept header value.
    pub accept: String,

    /// Accept-Language header value.
    pub accept_language: String,

    /// Additional headers applied after the core identity fields.
    pub extra_headers: BTreeMap<String, String>,
}

impl Default for IdentityProfile {
    fn default() -> Self {
        let extra_headers = [
            ("Sec-Fetch-Dest", "iframe"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "same-origin"),
            ("Upgrade-Insecure-Requests", "1"),
            (
                "Sec-Ch-Ua",
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
            ),
            ("Sec-Ch-Ua-Mobile", "?0"),
            ("Sec-Ch-Ua-Platform", "\"Windows\""),
            ("Cache-Control", "max-age=0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            referer: None,
            origin: None,
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            extra_headers,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allow_headers: "*".to_string(),
            expose_headers: "*".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// Rewriting engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Largest HTML/manifest body that will be buffered for rewriting.
    pub max_body_bytes: usize,

    /// Treat `text/plain` responses as manifests (common CDN mislabeling).
    pub plain_text_as_manifest: bool,

    /// Wrap absolute HTML references whose host equals the page host.
    pub wrap_same_host: bool,

    /// Extensions that mark a bare relative manifest token as a URL.
    pub media_extensions: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 8 * 1024 * 1024, // 8MB
            plain_text_as_manifest: true,
            wrap_same_host: false,
            media_extensions: DEFAULT_MEDIA_EXTENSIONS.into_iter().map(String::from).collect(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
