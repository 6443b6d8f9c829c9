//! Pipeline status shared with the health endpoint
//!
//! The poll loop owns the authoritative `PipelineStatus` and publishes a
//! whole copy after every transition. Readers clone the published copy, so a
//! reader never sees half of an update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::delivery::CycleStatus;

/// Poll loop state machine phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Started, no cycle run yet
    #[default]
    Idle,
    Polling,
    Delivering,
    Sleeping,
    /// Shutdown requested; terminal
    Draining,
}

/// Point-in-time view of the poll loop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub phase: LoopPhase,
    /// Number of the current (or last) cycle, starting at 1
    pub cycle: u64,
    pub consecutive_failures: u32,
    /// Sink acceptances since startup
    pub total_records_delivered: u64,
    pub last_cycle_status: Option<CycleStatus>,
    pub last_error: Option<String>,
    /// Capture time of the last successful fetch
    pub last_successful_poll: Option<DateTime<Utc>>,
}

/// Shared, atomically replaced status snapshot
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<PipelineStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the latest published status
    pub async fn snapshot(&self) -> PipelineStatus {
        self.inner.read().await.clone()
    }

    /// Replace the published status
    pub async fn publish(&self, status: PipelineStatus) {
        *self.inner.write().await = status;
    }
}
