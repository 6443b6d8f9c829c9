//! Streaming ingestion sink
//!
//! Posts each batch to an ingestion gateway using the `PutRecordBatch` JSON
//! shape: every record travels as one newline-terminated JSON line in
//! `Records[].Data`, and the gateway answers with `FailedPutCount` plus one
//! `RequestResponses` entry per record, in submission order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{DeliverySink, PutBatchResponse, RecordError};
use crate::error::SinkError;
use crate::services::source_client::USER_AGENT;
use crate::types::EnrichedRecord;

/// Upper bound on records per `PutRecordBatch` call
pub const MAX_RECORDS_PER_BATCH: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchInput<'a> {
    delivery_stream_name: &'a str,
    records: Vec<StreamRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StreamRecord {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchOutput {
    #[serde(default)]
    failed_put_count: usize,
    #[serde(default)]
    request_responses: Vec<PutRecordBatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PutRecordBatchEntry {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// HTTP client for a delivery stream
pub struct StreamIngestSink {
    http_client: reqwest::Client,
    endpoint: String,
    stream_name: String,
    display_name: String,
}

impl StreamIngestSink {
    pub fn new(
        endpoint: impl Into<String>,
        stream_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::TransportFailure(e.to_string()))?;

        let stream_name = stream_name.into();
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            display_name: format!("stream:{}", stream_name),
            stream_name,
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[async_trait]
impl DeliverySink for StreamIngestSink {
    fn name(&self) -> &str {
        &self.display_name
    }

    async fn put_batch(&self, records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError> {
        let input = PutRecordBatchInput {
            delivery_stream_name: &self.stream_name,
            records: records
                .iter()
                .map(|r| StreamRecord {
                    data: r.to_json_line(),
                })
                .collect(),
        };

        debug!(
            stream = %self.stream_name,
            records = records.len(),
            "Sending PutRecordBatch"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&input)
            .send()
            .await
            .map_err(|e| SinkError::TransportFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::TransportFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let output: PutRecordBatchOutput = response
            .json()
            .await
            .map_err(|e| SinkError::TransportFailure(format!("unreadable response: {}", e)))?;

        Ok(into_put_batch_response(output, records.len()))
    }
}

fn into_put_batch_response(output: PutRecordBatchOutput, submitted: usize) -> PutBatchResponse {
    let record_errors: Vec<RecordError> = output
        .request_responses
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            entry.error_code.map(|code| RecordError {
                index,
                code,
                message: entry.error_message.unwrap_or_default(),
            })
        })
        .collect();

    let rejected = output.failed_put_count.min(submitted);
    PutBatchResponse {
        accepted_count: submitted - rejected,
        rejected_count: rejected,
        record_errors,
    }
}
