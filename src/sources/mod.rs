//! Cost sources: where raw cost payloads come from
//!
//! Sources hand back the parsed JSON untouched. Shape detection and
//! normalization belong to `aggregation`.

mod file;
mod http;
mod traits;

pub use file::FileCostSource;
pub use http::HttpCostSource;
pub use traits::*;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Please select a time window")]
    MissingWindow,
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Invalid JSON in response: {0}")]
    Decode(String),
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Raw payload plus when the source says it was last updated.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPayload {
    pub body: Value,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Parse a response body; a blank body counts as no payload.
pub(crate) fn parse_body(text: &str) -> Result<Value, FetchError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|err| FetchError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_is_null() {
        assert_eq!(parse_body("  \n").unwrap(), Value::Null);
    }

    #[test]
    fn garbage_body_is_decode_error() {
        assert!(matches!(parse_body("<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn http_error_message_carries_status_and_body() {
        let err = FetchError::Http {
            status: 500,
            message: "db unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 500: db unavailable");
    }
}
