//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0 and ordered, addresses parse)
//! - Reject header values that could never be sent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., `upstream.timeout_secs`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if let Some(origin) = &config.proxy.public_origin {
        if let Err(message) = check_public_origin(origin) {
            errors.push(ValidationError::new("proxy.public_origin", message));
        }
    }

    let upstream = &config.upstream;
    for (field, value) in [
        ("upstream.connect_timeout_secs", upstream.connect_timeout_secs),
        ("upstream.timeout_secs", upstream.timeout_secs),
        ("upstream.request_timeout_secs", upstream.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    // The router timeout must outlast the upstream deadline.
    if upstream.timeout_secs > 0 && upstream.request_timeout_secs <= upstream.timeout_secs {
        errors.push(ValidationError::new(
            "upstream.request_timeout_secs",
            format!(
                "must be greater than upstream.timeout_secs ({})",
                upstream.timeout_secs
            ),
        ));
    }

    let identity = &config.identity;
    check_header_value(&mut errors, "identity.user_agent", &identity.user_agent);
    check_header_value(&mut errors, "identity.accept", &identity.accept);
    check_header_value(&mut errors, "identity.accept_language", &identity.accept_language);
    if let Some(referer) = &identity.referer {
        check_header_value(&mut errors, "identity.referer", referer);
    }
    if let Some(origin) = &identity.origin {
        check_header_value(&mut errors, "identity.origin", origin);
    }
    if identity.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("identity.user_agent", "must not be empty"));
    }
    for (name, value) in &identity.extra_headers {
        let field = format!("identity.extra_headers.{}", name);
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(field.clone(), "invalid header name"));
        }
        check_header_value(&mut errors, &field, value);
    }

    let cors = &config.cors;
    check_header_value(&mut errors, "cors.allow_origin", &cors.allow_origin);
    check_header_value(&mut errors, "cors.allow_methods", &cors.allow_methods);
    check_header_value(&mut errors, "cors.allow_headers", &cors.allow_headers);
    check_header_value(&mut errors, "cors.expose_headers", &cors.expose_headers);

    if config.rewrite.max_body_bytes == 0 {
        errors.push(ValidationError::new("rewrite.max_body_bytes", "must be greater than 0"));
    }
    for ext in &config.rewrite.media_extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            errors.push(ValidationError::new(
                "rewrite.media_extensions",
                format!("extension {:?} must start with '.'", ext),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("{:?} is not a socket address", value),
        ));
    }
}

fn check_header_value(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if HeaderValue::from_str(value).is_err() {
        errors.push(ValidationError::new(field, "not a valid header value"));
    }
}

fn check_public_origin(origin: &str) -> Result<(), String> {
    let url = Url::parse(origin).map_err(|e| format!("{:?} is not a URL: {}", origin, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("scheme {:?} is not http or https", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err("must be a bare origin without path, query or fragment".to_string());
    }
    Ok(())
}
