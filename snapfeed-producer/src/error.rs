//! Error types for snapfeed-producer
//!
//! Pipeline errors (`FetchError`, `ValidationRejection`, `SinkError`) never
//! escape a cycle: they are converted into cycle results at their origin.
//! `ApiError` shapes HTTP error responses for the liveness server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure to obtain a snapshot from the upstream API
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Request exceeded the client timeout
    #[error("API request timed out")]
    Timeout,

    /// Connection failure or non-2xx status
    #[error("API transport failure: {0}")]
    TransportFailure(String),

    /// Body was not valid JSON
    #[error("Malformed API payload: {0}")]
    MalformedPayload(String),

    /// Top-level JSON was neither an object nor an array
    #[error("Unexpected API response shape: {0}")]
    UnexpectedShape(String),

    /// Upstream answered with an `error` object instead of data
    #[error("API reported error: {0}")]
    UpstreamReportedError(String),
}

/// Why a record was dropped before enrichment
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationRejection {
    #[error("record is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    #[error("record carries an upstream error key")]
    UpstreamErrorRecord,

    #[error("record has {present} of the required fields, needs at least {required}")]
    TooFewRequiredFields { present: usize, required: usize },

    #[error("timestamp field '{0}' is null")]
    NullTimestamp(String),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Per-sink, per-batch delivery failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    /// The batch never reached the sink, or the sink answered with an error
    #[error("sink transport failure: {0}")]
    TransportFailure(String),

    /// The sink accepted part of the batch
    #[error("sink rejected {rejected} of {submitted} records")]
    PartialRejection { rejected: usize, submitted: usize },
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
