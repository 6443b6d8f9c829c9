//! Health check endpoint
//!
//! Liveness only: the endpoint reports healthy whatever the pipeline is
//! doing, and carries the latest pipeline status for diagnostics.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use snapfeed_common::time::now;

use super::not_found;
use crate::status::PipelineStatus;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Service name ("snapfeed-producer")
    pub service: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Time of this response
    pub timestamp: DateTime<Utc>,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Latest published poll loop status
    pub pipeline: PipelineStatus,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let timestamp = now();
    let uptime_seconds = timestamp
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.service.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp,
        uptime_seconds,
        pipeline: state.status.snapshot().await,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check).fallback(not_found))
}
