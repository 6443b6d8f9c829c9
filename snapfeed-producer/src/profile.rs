//! Record profiles
//!
//! A profile describes one upstream data domain: which fields make a record
//! deliverable, which fields carry types, and how enrichment scores it.
//! Validation and enrichment both read from the same profile so the two
//! stages never disagree about the shape of a record.

use serde_json::Value;

/// JSON type demanded of a typed field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON number without a fractional part
    Integer,
    String,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::String => value.is_string(),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Integer => "an integer",
            FieldKind::String => "a string",
        }
    }
}

/// Description of one upstream data domain
#[derive(Debug, Clone, PartialEq)]
pub struct RecordProfile {
    /// Profile name as used in configuration ("crm", "web")
    pub name: String,
    /// Fields a well-formed record is expected to carry
    pub required_fields: Vec<String>,
    /// How many of `required_fields` must be present
    pub min_required: usize,
    /// Fields whose JSON type is checked when present
    pub typed_fields: Vec<(String, FieldKind)>,
    /// Fields that must not be `null` when present; the first one is the
    /// event time used for `timestamp_iso`
    pub timestamp_fields: Vec<String>,
    /// Reject records that carry an `error` key
    pub reject_error_records: bool,
    /// Quality score deductions for absent nice-to-have fields; empty means
    /// no score is emitted
    pub quality_penalties: Vec<(String, f64)>,
    /// Provenance label used when none is configured
    pub default_source_label: String,
    /// Pipeline label used when none is configured
    pub default_pipeline_label: String,
}

impl RecordProfile {
    /// Customer interaction records
    ///
    /// Every required field must be present; `customer_id` is an integer and
    /// `interaction_type` a string.
    pub fn crm() -> Self {
        Self {
            name: "crm".to_string(),
            required_fields: strings(&["customer_id", "interaction_type", "timestamp"]),
            min_required: 3,
            typed_fields: vec![
                ("customer_id".to_string(), FieldKind::Integer),
                ("interaction_type".to_string(), FieldKind::String),
            ],
            timestamp_fields: strings(&["timestamp"]),
            reject_error_records: false,
            quality_penalties: vec![
                ("rating".to_string(), 0.2),
                ("message_excerpt".to_string(), 0.1),
                ("channel".to_string(), 0.1),
            ],
            default_source_label: "crm-api".to_string(),
            default_pipeline_label: "crm-processor".to_string(),
        }
    }

    /// Web traffic events
    ///
    /// Payload shape varies by event type, so any three of the six expected
    /// fields are enough.
    pub fn web() -> Self {
        Self {
            name: "web".to_string(),
            required_fields: strings(&[
                "session_id",
                "page",
                "device_type",
                "browser",
                "event_type",
                "timestamp",
            ]),
            min_required: 3,
            typed_fields: Vec::new(),
            timestamp_fields: strings(&["timestamp"]),
            reject_error_records: true,
            quality_penalties: Vec::new(),
            default_source_label: "web-api".to_string(),
            default_pipeline_label: "web-processor".to_string(),
        }
    }

    /// Look up a built-in profile by its configuration name
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "crm" => Some(Self::crm()),
            "web" => Some(Self::web()),
            _ => None,
        }
    }

    pub fn with_min_required(mut self, min_required: usize) -> Self {
        self.min_required = min_required;
        self
    }

    /// Field holding the event time, if the profile has one
    pub fn event_time_field(&self) -> Option<&str> {
        self.timestamp_fields.first().map(String::as_str)
    }
}

fn strings(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}
