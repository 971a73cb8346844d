//! API Routes
//!
//! HTTP endpoints: the gossip status exchange, liveness, metrics and a
//! read-only view of the registry.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::api::Metrics;
use crate::config::NodeConfig;
use crate::registry::{Registry, SharedRegistry};
use crate::types::{self, StatusRequest, StatusResponse, STATUS_PATH};

/// Shared API state
pub struct ApiState {
    pub config: Arc<NodeConfig>,
    pub registry: SharedRegistry,
    pub metrics: Arc<Metrics>,
}

/// Build the router serving every endpoint of the node
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Gossip
        .route(STATUS_PATH, post(post_status))

        // Health & Status
        .route("/health", get(health_check))
        .route("/status", get(get_status))

        // Metrics
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))

        // Registry
        .route("/peers", get(get_peers))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server on the configured address
pub async fn run_api_server(
    config: Arc<NodeConfig>,
    registry: SharedRegistry,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("📡 Status server listening on {}", addr);

    serve(listener, config, registry, metrics).await
}

/// Serve on an already bound listener
pub async fn serve(
    listener: tokio::net::TcpListener,
    config: Arc<NodeConfig>,
    registry: SharedRegistry,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let state = Arc::new(ApiState {
        config,
        registry,
        metrics,
    });

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// POST /api/status - Answer a probe and accept an announcement
async fn post_status(State(state): State<Arc<ApiState>>, body: Bytes) -> impl IntoResponse {
    state.metrics.inc_status_requests();

    let request = StatusRequest::from_body(&body);

    let discoveries = {
        let reg = state.registry.read().await;
        discoveries_for(&reg, &request, state.config.discovery_limit)
    };

    debug!(
        "Status request (discovery={}, announce={:?}) answered with {} peers",
        request.discovery,
        request.announcement(),
        discoveries.len()
    );

    if let Some(url) = request.announcement() {
        if url != state.config.url {
            spawn_registration(state.clone(), url.to_string());
        }
    }

    let response = StatusResponse::ok(discoveries);
    let request_time = types::format_request_time(Utc::now());

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (HeaderName::from_static("x-request-time"), request_time),
        ],
        Json(response),
    )
}

/// Peers to return for a status request.
///
/// Empty unless the caller asked for discovery. Capped by the smaller of
/// the caller's limit and our own; the full snapshot is sent when it fits.
fn discoveries_for(registry: &Registry, request: &StatusRequest, configured_limit: usize) -> Vec<String> {
    match request.discovery_intent() {
        None => Vec::new(),
        Some(requested) => {
            let cap = requested.map_or(configured_limit, |limit| limit.min(configured_limit));
            registry.sample(cap)
        }
    }
}

/// Register an announced caller off the request path
fn spawn_registration(state: Arc<ApiState>, url: String) {
    tokio::spawn(async move {
        let mut reg = state.registry.write().await;
        if reg.register(&url) {
            state.metrics.add_peers_discovered(1);
        }
        state.metrics.set_known_peers(reg.len() as u64);
    });
}

/// GET /status - Detailed status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let stats = state.registry.read().await.stats();

    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "url": state.config.url,
        "uptime_secs": state.metrics.uptime_secs(),
        "registry": stats,
    }))
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    {
        let reg = state.registry.read().await;
        state.metrics.set_known_peers(reg.len() as u64);
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    {
        let reg = state.registry.read().await;
        state.metrics.set_known_peers(reg.len() as u64);
    }

    Json(state.metrics.to_json())
}

/// GET /peers - Known hosts with their statistics
async fn get_peers(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let reg = state.registry.read().await;

    let peers: Vec<_> = reg
        .hosts()
        .map(|h| serde_json::json!({
            "url": h.url,
            "priority": h.priority,
            "score": h.checks.score(),
            "average": h.checks.average(),
            "checks": h.checks.size(),
            "last_check": h.checks.last(),
            "offline_since": h.checks.outage_start(),
        }))
        .collect();

    Json(serde_json::json!({
        "count": peers.len(),
        "peers": peers,
    }))
}
