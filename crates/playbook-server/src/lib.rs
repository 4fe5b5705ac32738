//! # playbook-server
//!
//! HTTP surface of the playbook MCP endpoint:
//!
//! - `GET /mcp/{playbook_id}` returns the discovery manifest
//! - `POST /mcp/{playbook_id}` accepts one JSON-RPC request
//! - `GET /health` and `GET /metrics` for operators

pub mod metrics;
pub mod ratelimit;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use playbook_config::PlaybookConfig;
use playbook_core::{PlaybookError, Result};
use playbook_mcp::McpServer;

use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;

/// Shared server state.
pub struct AppState {
    pub mcp: McpServer,
    pub config: Arc<RwLock<PlaybookConfig>>,
    pub metrics: Metrics,
    /// `None` when rate limiting is disabled.
    pub rate_limiter: Option<RateLimiter>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

/// Build the router. CORS and rate-limit settings are read once here; the
/// protocol handlers read a fresh config snapshot per request.
pub fn build_router(mcp: McpServer, config: Arc<RwLock<PlaybookConfig>>) -> Router {
    let server = config.read().server.clone();

    let rate_limiter = server
        .rate_limit
        .enabled
        .then(|| RateLimiter::new(&server.rate_limit));
    if let Some(limiter) = rate_limiter.clone() {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(300)).await;
                limiter.cleanup();
            }
        });
    }

    let state = Arc::new(AppState {
        mcp,
        config,
        metrics: Metrics::new(),
        rate_limiter,
    });

    let mcp_routes = Router::new()
        .route("/mcp/{playbook_id}", get(discovery_handler).post(rpc_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            ratelimit::rate_limit_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(mcp_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if server.cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

/// Bind `listen` and serve until the process is stopped.
pub async fn start_server(
    mcp: McpServer,
    config: Arc<RwLock<PlaybookConfig>>,
    listen: &str,
) -> Result<()> {
    let router = build_router(mcp, config);
    let listener = tokio::net::TcpListener::bind(listen).await.map_err(|e| {
        PlaybookError::Config(format!("failed to bind {listen}: {e}"))
    })?;
    info!(listen = %listen, "playbook MCP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Credential from `Authorization: Bearer <key>`.
fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render_prometheus(),
    )
}

async fn discovery_handler(
    State(state): State<Arc<AppState>>,
    Path(playbook_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.metrics.inc_http_requests();
    match state.mcp.discover(&playbook_id, bearer(&headers)).await {
        Ok(manifest) => Json(manifest).into_response(),
        Err(e @ PlaybookError::PlaybookNotFound(_)) => {
            state.metrics.inc_http_errors();
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!(playbook = %playbook_id, error = %e, "discovery failed");
            state.metrics.inc_http_errors();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn rpc_handler(
    State(state): State<Arc<AppState>>,
    Path(playbook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.metrics.inc_http_requests();
    state.metrics.inc_rpc_requests();

    let outcome = state.mcp.handle(&playbook_id, bearer(&headers), &body).await;
    if outcome.is_error() {
        state.metrics.inc_rpc_errors();
    }
    if outcome.tool.is_some() {
        state.metrics.inc_tool_calls();
        if outcome.tool_failed() {
            state.metrics.inc_tool_errors();
        }
    }
    debug!(
        playbook = %playbook_id,
        method = outcome.method.as_deref().unwrap_or("-"),
        error = outcome.is_error(),
        "rpc handled"
    );

    match outcome.response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
