//! snapfeed-producer library interface
//!
//! Poll → validate → enrich → deliver pipeline with dual-sink fan-out,
//! failure backoff and a liveness endpoint. The binary in `main.rs` wires
//! these pieces together; integration tests drive them directly.

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod poll_loop;
pub mod profile;
pub mod services;
pub mod status;
pub mod types;
pub mod validators;

pub use crate::error::{ApiError, FetchError, SinkError, ValidationRejection};

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::status::StatusHandle;

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "snapfeed-producer";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Poll loop status, read-only from the API side
    pub status: StatusHandle,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    pub service: String,
}

impl AppState {
    pub fn new(status: StatusHandle) -> Self {
        Self {
            status,
            startup_time: Utc::now(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
