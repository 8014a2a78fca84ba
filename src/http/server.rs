//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router dispatching every path to the edge pipeline
//! - Wire up middleware (tracing, timeout, request ID)
//! - Buffer inbound bodies up to the configured limit
//! - Bind server to listener and drive graceful shutdown
//! - Translate pipeline errors into safe, generic HTTP responses

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::edge::EdgeProxy;
use crate::error::Error;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub edge: Arc<EdgeProxy>,
    pub max_body_bytes: usize,
}

/// HTTP server fronting the edge proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server around an assembled proxy instance.
    pub fn new(listener_config: &ListenerConfig, edge: Arc<EdgeProxy>) -> Self {
        let state = AppState {
            edge,
            max_body_bytes: listener_config.max_body_bytes,
        };
        let router = Self::build_router(listener_config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(listener_config: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(edge_handler))
            .route("/", any(edge_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                listener_config.request_timeout_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main handler: buffer the body, run the pipeline, relay the response.
async fn edge_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!(request_id = %request_id, %method, %path, "request body exceeds limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };
    let request = Request::from_parts(parts, body);

    match state.edge.handle(request).await {
        Ok(response) => {
            tracing::debug!(
                request_id = %request_id,
                %method,
                %path,
                status = response.status().as_u16(),
                "request handled"
            );
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::from(body))
        }
        Err(error @ (Error::NoHandlersForRoute(_) | Error::NoResponse(_))) => {
            tracing::error!(request_id = %request_id, %method, %path, %error, "pipeline misconfigured");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
        Err(error) => {
            tracing::error!(request_id = %request_id, %method, %path, %error, "pipeline failed");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
