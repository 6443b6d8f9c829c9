//! Test doubles shared by the integration tests
//!
//! Sinks and sources that record what they were given, plus an in-process
//! HTTP server for upstream and gateway stand-ins.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use snapfeed_common::time::now;
use snapfeed_producer::delivery::{BatchDeliverer, DeliverySink, PutBatchResponse, RecordError};
use snapfeed_producer::error::{FetchError, SinkError};
use snapfeed_producer::profile::RecordProfile;
use snapfeed_producer::services::{RecordEnricher, RecordSource};
use snapfeed_producer::types::{EnrichedRecord, Snapshot};
use snapfeed_producer::validators::RecordValidator;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A web-profile record that passes validation
pub fn web_record(i: usize) -> Value {
    json!({
        "session_id": format!("s{}", i),
        "page": format!("/page/{}", i),
        "timestamp": 1_690_000_000 + i as i64,
    })
}

pub fn web_records(n: usize) -> Vec<Value> {
    (0..n).map(web_record).collect()
}

pub fn web_deliverer(batch_size: usize) -> BatchDeliverer {
    BatchDeliverer::new(
        RecordValidator::new(RecordProfile::web()),
        RecordEnricher::for_profile(RecordProfile::web()),
        batch_size,
    )
}

/// Validate and enrich values with the web profile
pub fn enriched(values: Vec<Value>) -> Vec<EnrichedRecord> {
    web_deliverer(500).prepare(Snapshot::new(values, now()))
}

/// Sink that accepts everything and keeps each batch
pub struct RecordingSink {
    name: String,
    batches: Mutex<Vec<Vec<Value>>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<Value>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn records(&self) -> Vec<Value> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_batch(&self, records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError> {
        let batch = records
            .iter()
            .map(|r| r.as_record().clone().into_value())
            .collect();
        self.batches.lock().unwrap().push(batch);
        Ok(PutBatchResponse::all_accepted(records.len()))
    }
}

/// Sink whose every submission fails in transport
pub struct FailingSink {
    name: String,
    calls: AtomicUsize,
}

impl FailingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliverySink for FailingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_batch(&self, _records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::TransportFailure("connection refused".to_string()))
    }
}

/// Sink that rejects the first record of every batch
pub struct RejectFirstSink {
    name: String,
}

impl RejectFirstSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl DeliverySink for RejectFirstSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_batch(&self, records: &[EnrichedRecord]) -> Result<PutBatchResponse, SinkError> {
        Ok(PutBatchResponse {
            accepted_count: records.len() - 1,
            rejected_count: 1,
            record_errors: vec![RecordError {
                index: 0,
                code: "ServiceUnavailableException".to_string(),
                message: "Slow down.".to_string(),
            }],
        })
    }
}

/// Source replaying scripted responses
///
/// Once the script is exhausted every fetch returns `fallback`. If a cancel
/// point is set, the token is cancelled during that fetch (1-based).
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Value>, FetchError>>>,
    fallback: Result<Vec<Value>, FetchError>,
    fetch_times: Mutex<Vec<Instant>>,
    cancel_at: Option<(usize, CancellationToken)>,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<Result<Vec<Value>, FetchError>>,
        fallback: Result<Vec<Value>, FetchError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            fetch_times: Mutex::new(Vec::new()),
            cancel_at: None,
        }
    }

    pub fn cancel_on_fetch(mut self, fetch: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((fetch, token));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_times.lock().unwrap().len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetch_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let count = {
            let mut times = self.fetch_times.lock().unwrap();
            times.push(Instant::now());
            times.len()
        };
        if let Some((at, token)) = &self.cancel_at {
            if count == *at {
                token.cancel();
            }
        }

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map(|records| Snapshot::new(records, now()))
    }
}

/// Serve `router` on an ephemeral localhost port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
