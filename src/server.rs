// HTTP server for the rate limiting service
//
// Routes:
// - /health/               liveness probe
// - /metrics/              Prometheus text exposition
// - /metrics/ratelimit     decision statistics as JSON
// - /api/ratelimit/status  the caller's own quota state
//
// Every route passes through the global rate limit middleware, which skips
// the configured excluded prefixes.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::metrics;
use crate::rate_limit::{
    rate_limit_middleware, DashboardBuilder, MemoryWindowStore, RateLimitDecision, RateLimitState,
    RateLimiter,
};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub limiter: RateLimiter,
    pub metrics_enabled: bool,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let rate_limit_state = RateLimitState::global(state.limiter.clone());

    Router::new()
        .route("/health/", get(health_handler))
        .route("/metrics/", get(metrics_handler))
        .route("/metrics/ratelimit", get(dashboard_handler))
        .route("/api/ratelimit/status", get(status_handler))
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and the window purge loop
pub async fn serve(config: Config) -> Result<()> {
    if config.metrics.enabled {
        metrics::init().context("Failed to initialize metrics")?;
    }

    let store = Arc::new(MemoryWindowStore::new());
    let limiter = RateLimiter::new(config.rate_limit.clone(), store.clone());

    let purge_interval = Duration::from_secs(config.server.purge_interval_secs);
    tokio::spawn(purge_loop(store, purge_interval));

    let app = build_router(AppState {
        limiter,
        metrics_enabled: config.metrics.enabled,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(
        "Starting rate limit server on {} (enabled: {}, failure mode: {})",
        addr, config.rate_limit.enabled, config.rate_limit.failure_mode
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn purge_loop(store: Arc<MemoryWindowStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let purged = store.purge_expired().await;
        let live = store.count().await;
        metrics::RATE_LIMIT_TRACKED_WINDOWS.set(live as i64);
        if purged > 0 {
            debug!("Purged {} expired windows, {} live", purged, live);
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn dashboard_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(DashboardBuilder::new(state.limiter).build().await)
}

/// Reports the decision made for this very request
async fn status_handler(decision: Option<Extension<RateLimitDecision>>) -> Response {
    match decision {
        Some(Extension(decision)) => Json(json!({
            "identifier": decision.identifier,
            "tier": decision.tier,
            "endpoint_class": decision.endpoint_class,
            "limits": decision.info,
        }))
        .into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Rate limit middleware is not installed on this route",
        )
            .into_response(),
    }
}
