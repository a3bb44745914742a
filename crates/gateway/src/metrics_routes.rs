//! Prometheus scrape endpoint.

#[cfg(feature = "metrics")]
use axum::{
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};

#[cfg(feature = "metrics")]
use crate::server::AppState;

/// `GET /metrics` in Prometheus text exposition format. Unauthenticated so
/// scrapers can reach it; `503` when no recorder is installed.
#[cfg(feature = "metrics")]
pub async fn prometheus_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let handle = &state.gateway.metrics_handle;
    if handle.is_enabled() {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            handle.render(),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics not enabled".to_string(),
        )
    }
}
