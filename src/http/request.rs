//! Client-facing request type and correlation IDs.
//!
//! # Design Decisions
//! - Header names are unique keys; the last write wins
//! - Bodies stay typed until the outbound request is built
//! - Correlation IDs are UUID v4 strings

use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ResilienceError;

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Raw bytes, sent as is.
    Bytes(Vec<u8>),
    /// Text, sent as UTF-8 bytes with no implied content type.
    Text(String),
    /// Structured value, encoded as JSON.
    Json(serde_json::Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(b) => b.is_empty(),
            Body::Text(t) => t.is_empty(),
            Body::Json(_) => false,
        }
    }

    /// Encoded bytes plus the content type the encoding implies, if any.
    pub fn encode(&self) -> Result<(Option<Vec<u8>>, Option<&'static str>), ResilienceError> {
        match self {
            Body::Empty => Ok((None, None)),
            Body::Bytes(bytes) => Ok((Some(bytes.clone()), None)),
            Body::Text(text) => Ok((Some(text.as_bytes().to_vec()), None)),
            Body::Json(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| ResilienceError::InvalidRequest(format!("failed to encode JSON body: {e}")))?;
                Ok((Some(bytes), Some("application/json")))
            }
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// A request as issued by callers of the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Absolute URL, or a path joined onto the client's base URL.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Body,
    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,
    /// Retry override; the larger of this and the client default applies.
    pub max_retries: Option<u32>,
    pub correlation_id: Option<String>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: Body::Empty,
            timeout: None,
            max_retries: None,
            correlation_id: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, ResilienceError> {
        let value = serde_json::to_value(value)
            .map_err(|e| ResilienceError::InvalidRequest(format!("failed to encode JSON body: {e}")))?;
        self.body = Body::Json(value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Generate a fresh correlation ID.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
