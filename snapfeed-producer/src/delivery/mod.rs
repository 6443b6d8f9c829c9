//! Delivery to downstream sinks
//!
//! A sink accepts batches of enriched records. Each sink is delivered to
//! independently: there is no shared transaction, and no sink's failure
//! affects another.

pub mod deliverer;
pub mod object_store;
pub mod stream_sink;

pub use deliverer::{BatchDeliverer, BatchOutcome, CycleResult, CycleStatus, SinkReport};
pub use object_store::{LocalObjectStore, ObjectStore, ObjectStoreSink};
pub use stream_sink::StreamIngestSink;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SinkError;
use crate::types::EnrichedRecord;

/// Error detail for one rejected record within a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    /// Position of the record within the submitted batch
    pub index: usize,
    pub code: String,
    pub message: String,
}

/// A sink's answer to one batch submission
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PutBatchResponse {
    pub accepted_count: usize,
    pub rejected_count: usize,
    pub record_errors: Vec<RecordError>,
}

impl PutBatchResponse {
    /// Every record accepted
    pub fn all_accepted(count: usize) -> Self {
        Self {
            accepted_count: count,
            rejected_count: 0,
            record_errors: Vec::new(),
        }
    }
}

/// Downstream delivery target with a batch-accept contract
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Sink name for logs and reports
    fn name(&self) -> &str;

    /// Submit one batch
    ///
    /// `Ok` means the sink answered; partial rejection is reported through
    /// `rejected_count`. `Err` means the batch did not get an answer.
    async fn put_batch(&self, records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError>;
}
