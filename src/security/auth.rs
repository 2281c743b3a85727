//! Outbound authentication headers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use crate::error::ResilienceError;

/// Authentication scheme applied to every outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
        key: String,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

impl AuthConfig {
    /// Insert the credentials for this scheme, replacing any existing value.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), ResilienceError> {
        match self {
            AuthConfig::None => {}
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                headers.insert(AUTHORIZATION, sensitive(&format!("Basic {encoded}"))?);
            }
            AuthConfig::Bearer { token } => {
                headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {token}"))?);
            }
            AuthConfig::ApiKey { header, key } => {
                let name = HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
                    ResilienceError::InvalidConfiguration(format!("invalid api key header '{header}': {e}"))
                })?;
                headers.insert(name, sensitive(key)?);
            }
        }
        Ok(())
    }
}

fn sensitive(value: &str) -> Result<HeaderValue, ResilienceError> {
    let mut value = HeaderValue::from_str(value).map_err(|e| {
        ResilienceError::InvalidConfiguration(format!("credentials are not a valid header value: {e}"))
    })?;
    value.set_sensitive(true);
    Ok(value)
}
