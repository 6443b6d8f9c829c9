//! Poll loop
//!
//! Sequential scheduling core: fetch → deliver → record outcome → sleep.
//!
//! State machine: `Idle → Polling → Delivering → Sleeping → Polling → ...`,
//! with `Draining` as the terminal phase once shutdown is requested.
//!
//! Backoff is a single extended pause, not exponential: once
//! `consecutive_failures` reaches `max_retries` the loop sleeps `retry_delay`
//! and then resets the counter to 0, whatever the next cycle does.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::delivery::{BatchDeliverer, CycleResult, CycleStatus, DeliverySink};
use crate::error::FetchError;
use crate::services::RecordSource;
use crate::status::{LoopPhase, PipelineStatus, StatusHandle};

/// Timing and retry settings for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Pause between cycles while healthy
    pub poll_interval: Duration,
    /// Consecutive failed cycles that trigger the extended pause
    pub max_retries: u32,
    /// Extended pause length
    pub retry_delay: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Pause taken after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    Normal(Duration),
    Backoff(Duration),
}

impl Pause {
    pub fn duration(&self) -> Duration {
        match self {
            Pause::Normal(d) | Pause::Backoff(d) => *d,
        }
    }
}

/// Consecutive-failure counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureTracker {
    consecutive_failures: u32,
}

impl FailureTracker {
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record(&mut self, status: CycleStatus) {
        if status.is_progress() {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    /// Pause to take given the current count
    pub fn next_pause(&self, settings: &LoopSettings) -> Pause {
        if self.consecutive_failures >= settings.max_retries {
            Pause::Backoff(settings.retry_delay)
        } else {
            Pause::Normal(settings.poll_interval)
        }
    }

    /// Clear the count once an extended pause has been taken
    pub fn finish_backoff(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Fetch failed; nothing was delivered
    FetchFailed(FetchError),
    /// Fetch succeeded and delivery was attempted
    Delivered(CycleResult),
}

impl CycleOutcome {
    pub fn status(&self) -> CycleStatus {
        match self {
            CycleOutcome::FetchFailed(_) => CycleStatus::FullyFailed,
            CycleOutcome::Delivered(result) => result.status(),
        }
    }

    pub fn records_delivered(&self) -> usize {
        match self {
            CycleOutcome::FetchFailed(_) => 0,
            CycleOutcome::Delivered(result) => result.records_delivered(),
        }
    }
}

/// Final counters reported on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub total_records_delivered: u64,
}

/// The producer's control loop
pub struct PollLoop {
    source: Arc<dyn RecordSource>,
    deliverer: BatchDeliverer,
    sinks: Vec<Arc<dyn DeliverySink>>,
    settings: LoopSettings,
    failures: FailureTracker,
    status: PipelineStatus,
    status_handle: StatusHandle,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn RecordSource>,
        deliverer: BatchDeliverer,
        sinks: Vec<Arc<dyn DeliverySink>>,
        settings: LoopSettings,
        status_handle: StatusHandle,
    ) -> Self {
        Self {
            source,
            deliverer,
            sinks,
            settings,
            failures: FailureTracker::default(),
            status: PipelineStatus::default(),
            status_handle,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.consecutive_failures()
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    async fn publish(&mut self, phase: LoopPhase) {
        self.status.phase = phase;
        self.status.consecutive_failures = self.failures.consecutive_failures();
        self.status_handle.publish(self.status.clone()).await;
    }

    /// Run one fetch-and-deliver cycle and record its outcome
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.status.cycle += 1;
        let cycle = self.status.cycle;
        self.publish(LoopPhase::Polling).await;
        debug!(cycle, "Starting cycle");

        let outcome = match self.source.fetch().await {
            Err(e) => {
                error!(cycle, error = %e, "Failed to poll API");
                self.status.last_error = Some(e.to_string());
                CycleOutcome::FetchFailed(e)
            }
            Ok(snapshot) => {
                self.status.last_successful_poll = Some(snapshot.fetched_at);
                self.publish(LoopPhase::Delivering).await;

                let result = self.deliverer.deliver(snapshot, &self.sinks).await;
                let status = result.status();
                if status.is_progress() {
                    self.status.last_error = None;
                } else {
                    self.status.last_error = Some(describe_failure(&result));
                }
                CycleOutcome::Delivered(result)
            }
        };

        let status = outcome.status();
        self.failures.record(status);
        self.status.last_cycle_status = Some(status);
        self.status.total_records_delivered += outcome.records_delivered() as u64;
        let phase = self.status.phase;
        self.publish(phase).await;

        match &outcome {
            CycleOutcome::Delivered(result) if status.is_progress() => info!(
                cycle,
                status = ?status,
                fetched = result.fetched,
                dropped = result.dropped,
                delivered = result.records_delivered(),
                "Cycle complete"
            ),
            _ => warn!(
                cycle,
                consecutive_failures = self.failures.consecutive_failures(),
                max_retries = self.settings.max_retries,
                "Cycle failed"
            ),
        }

        outcome
    }

    /// Run cycles until `shutdown` is cancelled
    ///
    /// Cancellation is checked before each cycle and before each sleep, and
    /// ends a sleep early. A fetch or sink submission in flight always
    /// completes first.
    pub async fn run(mut self, shutdown: CancellationToken) -> LoopSummary {
        info!(
            source = %self.source.describe(),
            sinks = self.sinks.len(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            max_retries = self.settings.max_retries,
            retry_delay_secs = self.settings.retry_delay.as_secs(),
            "Starting poll loop"
        );

        while !shutdown.is_cancelled() {
            self.run_cycle().await;

            if shutdown.is_cancelled() {
                break;
            }

            let pause = self.failures.next_pause(&self.settings);
            match pause {
                Pause::Backoff(delay) => warn!(
                    consecutive_failures = self.failures.consecutive_failures(),
                    delay_secs = delay.as_secs(),
                    "Max retries reached, backing off"
                ),
                Pause::Normal(delay) => debug!(delay_secs = delay.as_secs(), "Sleeping until next poll"),
            }
            self.publish(LoopPhase::Sleeping).await;

            let slept = tokio::select! {
                _ = tokio::time::sleep(pause.duration()) => true,
                _ = shutdown.cancelled() => false,
            };

            if let Pause::Backoff(_) = pause {
                self.failures.finish_backoff();
            }
            if !slept {
                break;
            }
        }

        self.publish(LoopPhase::Draining).await;
        let summary = LoopSummary {
            cycles: self.status.cycle,
            total_records_delivered: self.status.total_records_delivered,
        };
        info!(
            cycles = summary.cycles,
            total_records_delivered = summary.total_records_delivered,
            "Poll loop stopped"
        );
        summary
    }
}

fn describe_failure(result: &CycleResult) -> String {
    result
        .sinks
        .iter()
        .flat_map(|report| {
            report
                .batches
                .iter()
                .filter_map(move |batch| batch.error().map(|e| format!("{}: {}", report.sink, e)))
        })
        .next()
        .unwrap_or_else(|| "all sinks failed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_progress_resets_and_failure_increments() {
        let mut tracker = FailureTracker::default();
        tracker.record(CycleStatus::FullyFailed);
        tracker.record(CycleStatus::FullyFailed);
        assert_eq!(tracker.consecutive_failures(), 2);

        tracker.record(CycleStatus::PartiallySuccessful);
        assert_eq!(tracker.consecutive_failures(), 0);

        tracker.record(CycleStatus::FullyFailed);
        tracker.record(CycleStatus::FullySuccessful);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn test_backoff_after_max_retries() {
        let settings = settings();
        let mut tracker = FailureTracker::default();

        for _ in 0..2 {
            tracker.record(CycleStatus::FullyFailed);
            assert_eq!(tracker.next_pause(&settings), Pause::Normal(Duration::from_secs(10)));
        }

        tracker.record(CycleStatus::FullyFailed);
        assert_eq!(tracker.next_pause(&settings), Pause::Backoff(Duration::from_secs(120)));

        tracker.finish_backoff();
        assert_eq!(tracker.consecutive_failures(), 0);
        assert_eq!(tracker.next_pause(&settings), Pause::Normal(Duration::from_secs(10)));
    }

    #[test]
    fn test_default_settings() {
        let settings = LoopSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(60));
    }
}
