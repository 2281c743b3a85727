//! Client-facing response type.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ResilienceError;
use crate::http::request::Request;

/// Outcome of a request that produced an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Lower-cased header names; repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// The request as the caller issued it, with the correlation ID filled in.
    pub request: Request,
    /// Wall-clock time from admission to the final response.
    pub duration: Duration,
    /// Retries consumed, excluding the first attempt.
    pub retry_count: u32,
    pub correlation_id: Option<String>,
    /// Set when the final status is an error status.
    pub error: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ResilienceError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ResilienceError::Operation(format!("failed to decode JSON response: {e}")))
    }
}

/// Describe an error status for [`Response::error`].
pub(crate) fn status_error(status: u16) -> Option<String> {
    if status < 400 {
        return None;
    }
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");
    Some(format!("HTTP {status} {reason}"))
}
