//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler on every path and method
//! - Wire up middleware (request ID, tracing, timeout)
//! - Bind server to listener and drain on shutdown
//! - Drive one request through resolve → build → fetch → transform → finalize

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, Method, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::error::ProxyError;
use crate::http::request::{proxy_origin, request_id, ProxyRequest, UuidRequestId, X_REQUEST_ID};
use crate::http::response::{apply_cors, finalize, preflight_response};
use crate::http::transform::{transform_response, BodyKind};
use crate::lifecycle::shutdown;
use crate::observability::{metrics, spans};
use crate::upstream::{
    build_upstream_request, resolve_target, target_param, UpstreamClient, UpstreamIdentity,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub client: UpstreamClient,
}

/// HTTP server for the rewriting proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The configuration is expected to be validated already.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = UpstreamClient::from_config(&config.upstream)?;
        let config = Arc::new(config);

        let state = AppState {
            config: config.clone(),
            client,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: request ID assignment, trace span, request ID
    /// propagation, handler timeout.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.upstream.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(spans::request_span))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestId))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (parts, body) = request.into_parts();
    let method = parts.method.to_string();

    if parts.method == Method::OPTIONS {
        metrics::record_request(&method, 204, "preflight", start_time);
        return preflight_response(&state.config.cors);
    }

    let request_id = request_id(&parts.headers);
    match forward(&state, parts, body).await {
        Ok((kind, response)) => {
            tracing::debug!(
                request_id = %request_id,
                status = response.status().as_u16(),
                kind = kind.as_str(),
                "Response ready"
            );
            metrics::record_request(&method, response.status().as_u16(), kind.as_str(), start_time);
            response
        }
        Err(err) => {
            if err.status().is_server_error() {
                tracing::error!(request_id = %request_id, kind = err.kind(), error = %err, "Proxy request failed");
            } else {
                tracing::warn!(request_id = %request_id, kind = err.kind(), error = %err, "Rejected proxy request");
            }
            let status = err.status().as_u16();
            let mut response = err.into_response();
            apply_cors(response.headers_mut(), &state.config.cors);
            metrics::record_request(&method, status, "error", start_time);
            response
        }
    }
}

/// Resolve the target, call the upstream and shape its response.
async fn forward(
    state: &AppState,
    parts: Parts,
    body: Body,
) -> Result<(BodyKind, Response), ProxyError> {
    let raw = target_param(parts.uri.query()).ok_or(ProxyError::MissingTarget)?;
    let target = resolve_target(&raw)?;
    let origin = proxy_origin(
        state.config.proxy.public_origin.as_deref(),
        &parts.headers,
        &parts.uri,
        &state.config.listener.bind_address,
    );

    tracing::info!(
        method = %parts.method,
        target_url = %target.url(),
        "Proxying request"
    );

    let method = parts.method.clone();
    let identity = UpstreamIdentity::for_target(&state.config.identity, &target);
    let request = ProxyRequest::new(parts.method, target.clone(), parts.headers, Some(body), origin);
    let proxy_origin = request.proxy_origin().to_string();

    let upstream = state
        .client
        .execute(build_upstream_request(request, &identity))
        .await?;

    let (kind, mut response) = transform_response(
        &method,
        upstream,
        &target,
        &proxy_origin,
        &state.config.rewrite,
    )
    .await?;

    finalize(&mut response, target.url(), &proxy_origin, &state.config.cors);
    Ok((kind, response))
}
