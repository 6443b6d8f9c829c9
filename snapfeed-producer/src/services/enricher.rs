//! Record enricher
//!
//! Adds processing metadata to validated records. Enrichment is additive:
//! original keys are never removed, and only the keys listed in
//! [`ENRICHMENT_KEYS`] are written. On collision the enrichment value wins.

use chrono::{DateTime, Utc};
use snapfeed_common::time::{epoch_seconds_to_rfc3339, now, to_rfc3339};
use snapfeed_common::RawRecord;

use crate::profile::RecordProfile;
use crate::types::{EnrichedRecord, ValidatedRecord};

pub const PROCESSED_AT: &str = "processed_at";
pub const SOURCE: &str = "source";
pub const PIPELINE: &str = "pipeline";
pub const PROCESSOR_VERSION: &str = "processor_version";
pub const REGION: &str = "region";
pub const DATA_QUALITY_SCORE: &str = "data_quality_score";
pub const TIMESTAMP_ISO: &str = "timestamp_iso";

/// Every key the enricher may write
pub const ENRICHMENT_KEYS: [&str; 7] = [
    PROCESSED_AT,
    SOURCE,
    PIPELINE,
    PROCESSOR_VERSION,
    REGION,
    DATA_QUALITY_SCORE,
    TIMESTAMP_ISO,
];

/// Attaches capture time, provenance labels and a quality score
#[derive(Debug, Clone)]
pub struct RecordEnricher {
    profile: RecordProfile,
    source_label: String,
    pipeline_label: String,
    region: Option<String>,
    processor_version: String,
}

impl RecordEnricher {
    pub fn new(
        profile: RecordProfile,
        source_label: impl Into<String>,
        pipeline_label: impl Into<String>,
    ) -> Self {
        Self {
            profile,
            source_label: source_label.into(),
            pipeline_label: pipeline_label.into(),
            region: None,
            processor_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Enricher using the profile's default labels
    pub fn for_profile(profile: RecordProfile) -> Self {
        let source = profile.default_source_label.clone();
        let pipeline = profile.default_pipeline_label.clone();
        Self::new(profile, source, pipeline)
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn enrich(&self, record: ValidatedRecord) -> EnrichedRecord {
        self.enrich_at(record, now())
    }

    /// Enrich with an explicit capture time
    pub fn enrich_at(&self, record: ValidatedRecord, processed_at: DateTime<Utc>) -> EnrichedRecord {
        let mut record = record.into_inner();

        let score = self.quality_score(&record);
        let timestamp_iso = self
            .profile
            .event_time_field()
            .and_then(|field| record.get_f64(field))
            .and_then(epoch_seconds_to_rfc3339);

        record.insert(PROCESSED_AT, to_rfc3339(processed_at));
        record.insert(SOURCE, self.source_label.clone());
        record.insert(PIPELINE, self.pipeline_label.clone());
        record.insert(PROCESSOR_VERSION, self.processor_version.clone());
        if let Some(region) = &self.region {
            record.insert(REGION, region.clone());
        }
        if let Some(score) = score {
            record.insert(DATA_QUALITY_SCORE, score);
        }
        if let Some(iso) = timestamp_iso {
            record.insert(TIMESTAMP_ISO, iso);
        }

        EnrichedRecord::new(record)
    }

    /// Quality score in [0, 1], or `None` if the profile defines no penalties
    ///
    /// Starts at 1.0 and deducts the profile's weight for each absent
    /// nice-to-have field.
    pub fn quality_score(&self, record: &RawRecord) -> Option<f64> {
        if self.profile.quality_penalties.is_empty() {
            return None;
        }

        let score = self
            .profile
            .quality_penalties
            .iter()
            .filter(|(field, _)| !record.contains(field))
            .fold(1.0_f64, |score, (_, penalty)| score - penalty);

        // Round away float noise (1.0 - 0.2 - 0.1 - 0.1 = 0.6000000000000001)
        Some(((score * 1000.0).round() / 1000.0).clamp(0.0, 1.0))
    }
}
