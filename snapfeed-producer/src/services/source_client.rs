//! Upstream API client
//!
//! Fetches one snapshot per call and normalizes the response shape:
//! - object → one-element snapshot (unless it carries an `error` key)
//! - array → used as-is
//! - anything else → `FetchError::UnexpectedShape`

use async_trait::async_trait;
use serde_json::Value;
use snapfeed_common::record::json_type_name;
use snapfeed_common::time::now;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::types::Snapshot;

/// User-Agent sent on every outbound request
pub const USER_AGENT: &str = concat!("snapfeed-producer/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce one snapshot per poll
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Source description for logs
    fn describe(&self) -> String;

    /// Fetch one snapshot
    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

/// HTTP client for the upstream API
pub struct SourceClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl SourceClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::TransportFailure(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.into(),
        })
    }

    async fn request(&self) -> Result<Value, FetchError> {
        let response = self
            .http_client
            .get(&self.api_url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::TransportFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            )));
        }

        let body = response.bytes().await.map_err(classify_transport_error)?;

        serde_json::from_slice(&body).map_err(|e| {
            debug!(
                body = %truncate(&String::from_utf8_lossy(&body), 200),
                "Unparseable API response"
            );
            FetchError::MalformedPayload(e.to_string())
        })
    }
}

#[async_trait]
impl RecordSource for SourceClient {
    fn describe(&self) -> String {
        self.api_url.clone()
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        debug!(api_url = %self.api_url, "Polling API");

        let value = self.request().await?;
        let records = normalize_response(value)?;

        info!(records = records.len(), "Polled API successfully");
        if let Some(sample) = records.first() {
            debug!(sample = %sample, "Sample record");
        }

        Ok(Snapshot::new(records, now()))
    }
}

/// Normalize a decoded response into snapshot records
pub fn normalize_response(value: Value) -> Result<Vec<Value>, FetchError> {
    match value {
        Value::Object(map) => {
            if let Some(error) = map.get("error") {
                let message = match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                warn!(error = %message, "API returned error");
                return Err(FetchError::UpstreamReportedError(message));
            }
            Ok(vec![Value::Object(map)])
        }
        Value::Array(records) => Ok(records),
        other => Err(FetchError::UnexpectedShape(
            json_type_name(&other).to_string(),
        )),
    }
}

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::TransportFailure(e.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_becomes_single_record() {
        let record = json!({"session_id": "a1", "page": "/home", "timestamp": 1690000000});
        assert_eq!(normalize_response(record.clone()), Ok(vec![record]));
    }

    #[test]
    fn test_array_is_used_as_is() {
        let records = json!([{"a": 1}, 2, {"b": 3}]);
        assert_eq!(
            normalize_response(records),
            Ok(vec![json!({"a": 1}), json!(2), json!({"b": 3})])
        );
        assert_eq!(normalize_response(json!([])), Ok(vec![]));
    }

    #[test]
    fn test_error_object_is_upstream_error() {
        assert_eq!(
            normalize_response(json!({"error": "rate limited"})),
            Err(FetchError::UpstreamReportedError("rate limited".to_string()))
        );
        assert_eq!(
            normalize_response(json!({"error": {"code": 429}})),
            Err(FetchError::UpstreamReportedError("{\"code\":429}".to_string()))
        );
    }

    #[test]
    fn test_scalars_are_unexpected_shape() {
        assert_eq!(
            normalize_response(json!(null)),
            Err(FetchError::UnexpectedShape("null".to_string()))
        );
        assert_eq!(
            normalize_response(json!("ok")),
            Err(FetchError::UnexpectedShape("string".to_string()))
        );
        assert_eq!(
            normalize_response(json!(17)),
            Err(FetchError::UnexpectedShape("number".to_string()))
        );
    }

    #[test]
    fn test_client_creation() {
        let client = SourceClient::new("http://127.0.0.1:1/api", Duration::from_secs(1));
        assert!(client.is_ok());
    }
}
