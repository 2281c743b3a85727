//! Structured logging.
//!
//! The library only emits `tracing` events. Binaries call [`init_logging`]
//! once to install a subscriber; `RUST_LOG` overrides the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ResilienceError;

/// Bodies longer than this are cut before being logged.
pub const MAX_LOGGED_BODY: usize = 1024;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ResilienceError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("resilient_http={}", config.level)))
        .map_err(|e| ResilienceError::InvalidConfiguration(format!("invalid log level '{}': {e}", config.level)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };

    installed.map_err(|e| ResilienceError::InvalidConfiguration(format!("failed to install logger: {e}")))
}

/// Render a body for a log field, lossy and truncated.
pub fn preview_body(body: &[u8]) -> String {
    let cut = body.len().min(MAX_LOGGED_BODY);
    let mut text = String::from_utf8_lossy(&body[..cut]).into_owned();
    if body.len() > MAX_LOGGED_BODY {
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview_body(b"hello"), "hello");

        let long = vec![b'a'; MAX_LOGGED_BODY + 10];
        let preview = preview_body(&long);
        assert_eq!(preview.len(), MAX_LOGGED_BODY + 3);
        assert!(preview.ends_with("..."));
    }
}
