//! Batch deliverer
//!
//! Turns a snapshot into delivered batches:
//! validate → enrich → chunk → submit every batch to every sink.
//!
//! Delivery is best-effort and at-most-once. Rejected or failed records are
//! logged and dropped; nothing is retried within the cycle or requeued.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{DeliverySink, RecordError};
use crate::error::SinkError;
use crate::services::RecordEnricher;
use crate::types::{EnrichedRecord, Snapshot};
use crate::validators::RecordValidator;

/// Per-sink result of one batch submission
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every record in the batch was accepted
    Delivered { records: usize },
    /// The sink answered but rejected some records
    PartialFailure {
        accepted: usize,
        rejected: usize,
        errors: Vec<RecordError>,
    },
    /// The batch got no usable answer
    SinkFailed { error: SinkError },
}

impl BatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, BatchOutcome::Delivered { .. })
    }

    pub fn accepted(&self) -> usize {
        match self {
            BatchOutcome::Delivered { records } => *records,
            BatchOutcome::PartialFailure { accepted, .. } => *accepted,
            BatchOutcome::SinkFailed { .. } => 0,
        }
    }

    /// The error for a failed batch
    pub fn error(&self) -> Option<SinkError> {
        match self {
            BatchOutcome::Delivered { .. } => None,
            BatchOutcome::PartialFailure {
                accepted, rejected, ..
            } => Some(SinkError::PartialRejection {
                rejected: *rejected,
                submitted: accepted + rejected,
            }),
            BatchOutcome::SinkFailed { error } => Some(error.clone()),
        }
    }
}

/// All batch outcomes for one sink in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReport {
    pub sink: String,
    pub batches: Vec<BatchOutcome>,
}

impl SinkReport {
    /// A sink succeeded iff every batch was fully delivered
    pub fn succeeded(&self) -> bool {
        self.batches.iter().all(BatchOutcome::is_delivered)
    }

    pub fn records_delivered(&self) -> usize {
        self.batches.iter().map(BatchOutcome::accepted).sum()
    }
}

/// Cycle classification across all configured sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// No sinks configured, nothing to send, or every sink succeeded
    FullySuccessful,
    /// At least one sink succeeded and at least one did not
    PartiallySuccessful,
    /// No sink succeeded
    FullyFailed,
}

impl CycleStatus {
    /// Classify a set of sink reports
    pub fn classify(reports: &[SinkReport]) -> Self {
        let succeeded = reports.iter().filter(|r| r.succeeded()).count();
        if succeeded == reports.len() {
            CycleStatus::FullySuccessful
        } else if succeeded > 0 {
            CycleStatus::PartiallySuccessful
        } else {
            CycleStatus::FullyFailed
        }
    }

    /// Partial success is forward progress for the failure counter
    pub fn is_progress(&self) -> bool {
        !matches!(self, CycleStatus::FullyFailed)
    }
}

/// Aggregate of one cycle's delivery attempts
#[derive(Debug, Clone, PartialEq)]
pub struct CycleResult {
    /// Records in the snapshot
    pub fetched: usize,
    /// Records that passed validation
    pub valid: usize,
    /// Records dropped by validation
    pub dropped: usize,
    /// One report per configured sink (empty when nothing was sent)
    pub sinks: Vec<SinkReport>,
}

impl CycleResult {
    pub fn status(&self) -> CycleStatus {
        CycleStatus::classify(&self.sinks)
    }

    /// Records accepted summed over sinks
    pub fn records_delivered(&self) -> usize {
        self.sinks.iter().map(SinkReport::records_delivered).sum()
    }

    /// True if no record survived validation
    pub fn is_empty(&self) -> bool {
        self.valid == 0
    }
}

/// Validates, enriches, batches and submits snapshots
#[derive(Debug, Clone)]
pub struct BatchDeliverer {
    validator: RecordValidator,
    enricher: RecordEnricher,
    batch_size: usize,
}

impl BatchDeliverer {
    /// `batch_size` is clamped to at least 1
    pub fn new(validator: RecordValidator, enricher: RecordEnricher, batch_size: usize) -> Self {
        Self {
            validator,
            enricher,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate and enrich a snapshot, dropping invalid records
    pub fn prepare(&self, snapshot: Snapshot) -> Vec<EnrichedRecord> {
        let mut enriched = Vec::with_capacity(snapshot.len());

        for (position, value) in snapshot.records.into_iter().enumerate() {
            match self.validator.validate(value) {
                Ok(record) => enriched.push(self.enricher.enrich(record)),
                Err(reason) => {
                    warn!(position, reason = %reason, "Skipping invalid record");
                }
            }
        }

        enriched
    }

    /// Split records into order-preserving batches of at most `batch_size`
    pub fn batches<'a>(&self, records: &'a [EnrichedRecord]) -> std::slice::Chunks<'a, EnrichedRecord> {
        records.chunks(self.batch_size)
    }

    /// Deliver one snapshot to every sink
    ///
    /// Sinks are visited sequentially, each receiving every batch. A failed
    /// batch does not stop later batches or other sinks.
    pub async fn deliver(&self, snapshot: Snapshot, sinks: &[Arc<dyn DeliverySink>]) -> CycleResult {
        let fetched = snapshot.len();
        let records = self.prepare(snapshot);
        let valid = records.len();
        let dropped = fetched - valid;

        if records.is_empty() {
            info!(fetched, dropped, "No new records to deliver");
            return CycleResult {
                fetched,
                valid,
                dropped,
                sinks: Vec::new(),
            };
        }

        let batch_count = records.len().div_ceil(self.batch_size);
        debug!(valid, batches = batch_count, sinks = sinks.len(), "Delivering records");

        let mut reports = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let mut outcomes = Vec::with_capacity(batch_count);
            for (batch_index, batch) in self.batches(&records).enumerate() {
                outcomes.push(submit_batch(sink.as_ref(), batch_index, batch).await);
            }

            let report = SinkReport {
                sink: sink.name().to_string(),
                batches: outcomes,
            };
            if report.succeeded() {
                info!(
                    sink = %report.sink,
                    records = report.records_delivered(),
                    "Delivered records"
                );
            } else {
                warn!(
                    sink = %report.sink,
                    delivered = report.records_delivered(),
                    submitted = valid,
                    "Sink delivery incomplete"
                );
            }
            reports.push(report);
        }

        CycleResult {
            fetched,
            valid,
            dropped,
            sinks: reports,
        }
    }
}

async fn submit_batch(
    sink: &dyn DeliverySink,
    batch_index: usize,
    batch: &[EnrichedRecord],
) -> BatchOutcome {
    match sink.put_batch(batch).await {
        Ok(response) if response.rejected_count == 0 => BatchOutcome::Delivered {
            records: batch.len(),
        },
        Ok(response) => {
            error!(
                sink = sink.name(),
                batch = batch_index,
                rejected = response.rejected_count,
                submitted = batch.len(),
                "Sink rejected records"
            );
            for record_error in &response.record_errors {
                error!(
                    sink = sink.name(),
                    batch = batch_index,
                    record = record_error.index,
                    code = %record_error.code,
                    message = %record_error.message,
                    "Record rejected"
                );
            }
            let rejected = response.rejected_count.min(batch.len());
            BatchOutcome::PartialFailure {
                accepted: batch.len() - rejected,
                rejected,
                errors: response.record_errors,
            }
        }
        Err(e) => {
            error!(sink = sink.name(), batch = batch_index, error = %e, "Sink delivery failed");
            BatchOutcome::SinkFailed { error: e }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, batches: Vec<BatchOutcome>) -> SinkReport {
        SinkReport {
            sink: name.to_string(),
            batches,
        }
    }

    fn failed() -> BatchOutcome {
        BatchOutcome::SinkFailed {
            error: SinkError::TransportFailure("connection reset".to_string()),
        }
    }

    #[test]
    fn test_classify_no_sinks_is_success() {
        assert_eq!(CycleStatus::classify(&[]), CycleStatus::FullySuccessful);
    }

    #[test]
    fn test_classify_all_mixed_none() {
        let ok = || report("ok", vec![BatchOutcome::Delivered { records: 3 }]);
        let bad = || report("bad", vec![failed()]);

        assert_eq!(CycleStatus::classify(&[ok(), ok()]), CycleStatus::FullySuccessful);
        assert_eq!(CycleStatus::classify(&[ok(), bad()]), CycleStatus::PartiallySuccessful);
        assert_eq!(CycleStatus::classify(&[bad(), bad()]), CycleStatus::FullyFailed);
    }

    #[test]
    fn test_one_failed_batch_fails_the_sink() {
        let sink = report(
            "stream",
            vec![
                BatchOutcome::Delivered { records: 100 },
                BatchOutcome::PartialFailure {
                    accepted: 98,
                    rejected: 2,
                    errors: Vec::new(),
                },
            ],
        );
        assert!(!sink.succeeded());
        assert_eq!(sink.records_delivered(), 198);
        assert_eq!(
            sink.batches[1].error(),
            Some(SinkError::PartialRejection {
                rejected: 2,
                submitted: 100
            })
        );
    }

    #[test]
    fn test_progress_mapping() {
        assert!(CycleStatus::FullySuccessful.is_progress());
        assert!(CycleStatus::PartiallySuccessful.is_progress());
        assert!(!CycleStatus::FullyFailed.is_progress());
    }
}
