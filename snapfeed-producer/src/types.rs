//! Core pipeline types
//!
//! Records move through three stages inside one cycle:
//! raw JSON value (in a `Snapshot`) → `ValidatedRecord` → `EnrichedRecord`.
//! None of them outlive the cycle that produced them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use snapfeed_common::RawRecord;

/// The full set of records returned by one poll
///
/// Elements are kept as raw JSON values in response order; non-object
/// elements are rejected later by validation rather than at fetch time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<Value>,
    /// Capture time of the poll
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(records: Vec<Value>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            records,
            fetched_at,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record that passed the validator's predicate
///
/// Only `RecordValidator` constructs these. Validity is established once and
/// never re-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord(RawRecord);

impl ValidatedRecord {
    pub(crate) fn new(record: RawRecord) -> Self {
        Self(record)
    }

    pub fn as_record(&self) -> &RawRecord {
        &self.0
    }

    pub fn into_inner(self) -> RawRecord {
        self.0
    }
}

/// A validated record plus processor-added fields
///
/// Serializes as the flat JSON object that sinks receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EnrichedRecord(RawRecord);

impl EnrichedRecord {
    pub(crate) fn new(record: RawRecord) -> Self {
        Self(record)
    }

    pub fn as_record(&self) -> &RawRecord {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serialize as a single JSON line terminated by `\n`
    pub fn to_json_line(&self) -> String {
        let mut line = self.0.clone().into_value().to_string();
        line.push('\n');
        line
    }
}
