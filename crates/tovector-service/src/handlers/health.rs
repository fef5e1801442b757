//! Health check handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since start-up.
    pub uptime_seconds: u64,
    /// `ok` or `unavailable`.
    pub database: String,
    /// Request counters.
    pub metrics: HealthMetrics,
}

/// Request counters reported by the health check.
#[derive(Debug, Serialize)]
pub struct HealthMetrics {
    /// Requests served.
    pub request_count: u64,
    /// Requests that ended in a 5xx.
    pub error_count: u64,
}

/// Health check endpoint. Always 200; a failed database ping is reported
/// in the body.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Database ping failed");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        service: "tovector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.metrics.uptime_seconds(),
        database: database.to_string(),
        metrics: HealthMetrics {
            request_count: state.metrics.request_count(),
            error_count: state.metrics.error_count(),
        },
    })
}
