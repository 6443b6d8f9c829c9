//! Batch delivery integration tests
//!
//! Validation filtering, batching, fan-out to several sinks and cycle
//! classification, driven through `BatchDeliverer::deliver`.

mod helpers;

use helpers::{web_deliverer, web_record, web_records, FailingSink, RecordingSink, RejectFirstSink};
use serde_json::{json, Value};
use snapfeed_common::time::now;
use snapfeed_producer::delivery::{BatchOutcome, CycleStatus, DeliverySink};
use snapfeed_producer::error::SinkError;
use snapfeed_producer::services::enricher::ENRICHMENT_KEYS;
use snapfeed_producer::types::Snapshot;
use std::sync::Arc;

fn snapshot(records: Vec<Value>) -> Snapshot {
    Snapshot::new(records, now())
}

#[tokio::test]
async fn test_no_sinks_is_fully_successful() {
    let result = web_deliverer(100).deliver(snapshot(web_records(3)), &[]).await;

    assert_eq!(result.status(), CycleStatus::FullySuccessful);
    assert_eq!(result.valid, 3);
    assert_eq!(result.records_delivered(), 0);
    assert!(result.sinks.is_empty());
}

#[tokio::test]
async fn test_empty_snapshot_calls_no_sink() {
    let failing = Arc::new(FailingSink::new("stream"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![failing.clone()];

    let result = web_deliverer(100).deliver(snapshot(vec![]), &sinks).await;

    assert_eq!(result.status(), CycleStatus::FullySuccessful);
    assert_eq!(result.fetched, 0);
    assert!(result.is_empty());
    assert_eq!(failing.calls(), 0);
}

#[tokio::test]
async fn test_invalid_records_never_reach_a_sink() {
    let sink = Arc::new(RecordingSink::new("archive"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![sink.clone()];

    let records = vec![
        web_record(1),
        json!("not an object"),
        json!({"session_id": "s2", "page": "/x"}),
        json!({"session_id": "s3", "page": "/x", "timestamp": null}),
        json!({"session_id": "s4", "page": "/x", "timestamp": 1, "error": "upstream"}),
        web_record(5),
    ];

    let result = web_deliverer(100).deliver(snapshot(records), &sinks).await;

    assert_eq!(result.fetched, 6);
    assert_eq!(result.valid, 2);
    assert_eq!(result.dropped, 4);

    let delivered: Vec<String> = sink
        .records()
        .iter()
        .map(|r| r["session_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(delivered, vec!["s1", "s5"]);
}

#[tokio::test]
async fn test_batching_preserves_count_and_order() {
    let sink = Arc::new(RecordingSink::new("archive"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![sink.clone()];

    let result = web_deliverer(3).deliver(snapshot(web_records(7)), &sinks).await;

    let sizes: Vec<usize> = sink.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    let ids: Vec<String> = sink
        .records()
        .iter()
        .map(|r| r["session_id"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..7).map(|i| format!("s{}", i)).collect();
    assert_eq!(ids, expected);

    assert_eq!(result.records_delivered(), 7);
    assert_eq!(result.sinks[0].batches.len(), 3);
}

#[tokio::test]
async fn test_single_web_record_reaches_both_sinks() {
    let stream = Arc::new(RecordingSink::new("stream"));
    let archive = Arc::new(RecordingSink::new("archive"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![stream.clone(), archive.clone()];

    let record = json!({"session_id": "a1", "page": "/home", "timestamp": 1690000000});
    let result = web_deliverer(100).deliver(snapshot(vec![record]), &sinks).await;

    assert_eq!(result.status(), CycleStatus::FullySuccessful);
    // One acceptance per sink
    assert_eq!(result.records_delivered(), 2);

    for sink in [&stream, &archive] {
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);

        let delivered = &batches[0][0];
        assert_eq!(delivered["session_id"], "a1");
        assert_eq!(delivered["page"], "/home");
        assert_eq!(delivered["timestamp"], 1690000000);
        assert!(delivered["processed_at"].is_string());
        assert_eq!(delivered["source"], "web-api");
        assert_eq!(delivered["pipeline"], "web-processor");
        assert_eq!(delivered["timestamp_iso"], "2023-07-22T04:26:40Z");
    }
}

#[tokio::test]
async fn test_enrichment_is_additive() {
    let sink = Arc::new(RecordingSink::new("archive"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![sink.clone()];

    let original = json!({
        "session_id": "a1",
        "page": "/home",
        "timestamp": 1690000000,
        "referrer": "https://example.com",
        "source": "upstream-label"
    });
    web_deliverer(100)
        .deliver(snapshot(vec![original.clone()]), &sinks)
        .await;

    let delivered = &sink.records()[0];
    for (key, value) in original.as_object().unwrap() {
        if ENRICHMENT_KEYS.contains(&key.as_str()) {
            continue;
        }
        assert_eq!(&delivered[key], value, "original key {} changed", key);
    }
    // Collision: enrichment value wins
    assert_eq!(delivered["source"], "web-api");
}

#[tokio::test]
async fn test_one_failing_sink_is_partial_success() {
    let archive = Arc::new(RecordingSink::new("archive"));
    let stream = Arc::new(FailingSink::new("stream"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![stream.clone(), archive.clone()];

    let result = web_deliverer(2).deliver(snapshot(web_records(5)), &sinks).await;

    assert_eq!(result.status(), CycleStatus::PartiallySuccessful);
    // Every batch is still offered to the failing sink
    assert_eq!(stream.calls(), 3);
    assert_eq!(archive.records().len(), 5);
    assert_eq!(result.records_delivered(), 5);

    let stream_report = &result.sinks[0];
    assert!(!stream_report.succeeded());
    assert!(stream_report.batches.iter().all(|b| matches!(
        b,
        BatchOutcome::SinkFailed {
            error: SinkError::TransportFailure(_)
        }
    )));
}

#[tokio::test]
async fn test_all_sinks_failing_is_fully_failed() {
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![
        Arc::new(FailingSink::new("stream")),
        Arc::new(FailingSink::new("archive")),
    ];

    let result = web_deliverer(100).deliver(snapshot(web_records(2)), &sinks).await;

    assert_eq!(result.status(), CycleStatus::FullyFailed);
    assert_eq!(result.records_delivered(), 0);
    assert!(!result.status().is_progress());
}

#[tokio::test]
async fn test_partial_rejection_fails_the_sink() {
    let archive = Arc::new(RecordingSink::new("archive"));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![
        Arc::new(RejectFirstSink::new("stream")),
        archive.clone(),
    ];

    let result = web_deliverer(2).deliver(snapshot(web_records(4)), &sinks).await;

    assert_eq!(result.status(), CycleStatus::PartiallySuccessful);

    let stream_report = &result.sinks[0];
    assert!(!stream_report.succeeded());
    assert_eq!(stream_report.records_delivered(), 2);
    match &stream_report.batches[0] {
        BatchOutcome::PartialFailure {
            accepted,
            rejected,
            errors,
        } => {
            assert_eq!(*accepted, 1);
            assert_eq!(*rejected, 1);
            assert_eq!(errors[0].code, "ServiceUnavailableException");
        }
        other => panic!("expected partial failure, got {:?}", other),
    }

    // 2 accepted by the stream + 4 by the archive
    assert_eq!(result.records_delivered(), 6);
}
