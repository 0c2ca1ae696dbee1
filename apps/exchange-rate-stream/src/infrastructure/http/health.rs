//! Health Check and Metrics Endpoints
//!
//! # Endpoints
//!
//! - `GET /exchange-rates/health` - Feed health as JSON
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (OK iff the feed is connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Overall feed health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The feed is connected.
    Healthy,
    /// The feed is not connected.
    Unhealthy,
}

/// Feed health response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Current time.
    pub timestamp: DateTime<Utc>,
    /// Name of the backing feed.
    pub service: String,
    /// Whether any price is known.
    pub has_price_data: bool,
    /// Number of pairs with a known price.
    pub price_data_count: usize,
    /// Display names of pairs with a known price, in registry order.
    pub connected_symbols: Vec<&'static str>,
    /// Connected SSE clients.
    pub stream_clients: usize,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Build the feed health response.
#[must_use]
pub fn build_health_response(state: &AppState) -> FeedHealthResponse {
    let feed = state.feed();
    let prices = feed.current_prices();

    FeedHealthResponse {
        status: if feed.is_connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        timestamp: Utc::now(),
        service: format!("{} WebSocket", feed.source()),
        has_price_data: !prices.is_empty(),
        price_data_count: prices.len(),
        connected_symbols: prices.keys().map(|pair| pair.display_name()).collect(),
        stream_clients: state.stream_clients(),
        uptime_secs: state.uptime().as_secs(),
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// Feed health. Always 200; the body carries the status.
pub async fn feed_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(build_health_response(&state))
}

/// Liveness probe.
pub async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe.
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.feed().is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Prometheus metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}
