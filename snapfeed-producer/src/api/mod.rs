//! HTTP API handlers for snapfeed-producer
//!
//! Only the liveness endpoint is served; every other path answers with a
//! JSON 404.

pub mod health;

pub use health::{health_routes, HealthResponse};

use axum::http::Uri;

use crate::error::ApiError;

/// Fallback handler for unknown paths
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
