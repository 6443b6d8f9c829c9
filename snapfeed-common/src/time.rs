//! Timestamp utilities

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 form used for all timestamps written into records
pub fn to_rfc3339(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Convert epoch seconds (integer or fractional) to an RFC 3339 string
///
/// Returns `None` for NaN, infinities, and values whose year falls outside
/// 0000..=9999, such as epochs given in milliseconds.
pub fn epoch_seconds_to_rfc3339(epoch_seconds: f64) -> Option<String> {
    if !epoch_seconds.is_finite() {
        return None;
    }

    let secs = epoch_seconds.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    let nanos = ((epoch_seconds - secs) * 1_000_000_000.0).round() as u32;
    let nanos = nanos.min(999_999_999);

    DateTime::from_timestamp(secs as i64, nanos)
        .filter(|dt| (0..=9999).contains(&dt.year()))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// `YYYY-MM-DD` partition for a timestamp (UTC)
pub fn date_partition(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}
