//! Record validator
//!
//! Decides whether a raw record is well-formed enough to deliver. Pure: the
//! same input always yields the same verdict, and nothing is logged here
//! (the deliverer logs drops with the returned reason).

use serde_json::Value;
use snapfeed_common::record::json_type_name;
use snapfeed_common::RawRecord;

use crate::error::ValidationRejection;
use crate::profile::RecordProfile;
use crate::types::ValidatedRecord;

/// Presence and type checks driven by a `RecordProfile`
#[derive(Debug, Clone)]
pub struct RecordValidator {
    profile: RecordProfile,
}

impl RecordValidator {
    pub fn new(profile: RecordProfile) -> Self {
        Self { profile }
    }

    /// True if the value would be accepted by [`validate`](Self::validate)
    pub fn is_valid(&self, value: &Value) -> bool {
        self.check(value).is_ok()
    }

    /// Check a raw value without consuming it
    ///
    /// Rules, in order:
    /// 1. Must be a JSON object
    /// 2. Must not carry an `error` key, if the profile rejects error records
    /// 3. At least `min_required` of the required fields present
    /// 4. No present timestamp field is `null`
    /// 5. Every present typed field has its declared JSON type
    pub fn check(&self, value: &Value) -> Result<(), ValidationRejection> {
        let Value::Object(map) = value else {
            return Err(ValidationRejection::NotAnObject(json_type_name(value)));
        };

        if self.profile.reject_error_records && map.contains_key("error") {
            return Err(ValidationRejection::UpstreamErrorRecord);
        }

        let present = self
            .profile
            .required_fields
            .iter()
            .filter(|field| map.contains_key(field.as_str()))
            .count();
        if present < self.profile.min_required {
            return Err(ValidationRejection::TooFewRequiredFields {
                present,
                required: self.profile.min_required,
            });
        }

        for field in &self.profile.timestamp_fields {
            if matches!(map.get(field.as_str()), Some(Value::Null)) {
                return Err(ValidationRejection::NullTimestamp(field.clone()));
            }
        }

        for (field, kind) in &self.profile.typed_fields {
            if let Some(v) = map.get(field.as_str()) {
                if !kind.matches(v) {
                    return Err(ValidationRejection::WrongType {
                        field: field.clone(),
                        expected: kind.describe(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate and take ownership of a raw value
    pub fn validate(&self, value: Value) -> Result<ValidatedRecord, ValidationRejection> {
        self.check(&value)?;
        match RawRecord::from_value(value) {
            Ok(record) => Ok(ValidatedRecord::new(record)),
            Err(other) => Err(ValidationRejection::NotAnObject(json_type_name(&other))),
        }
    }
}
