//! Transport seam.
//!
//! The client hands one fully built exchange to a [`Transport`] per attempt.
//! [`HttpTransport`] is the reqwest-backed implementation; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Certificate, Identity, Method};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::config::{ClientConfig, TlsConfig};
use crate::error::ResilienceError;

/// One exchange, ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// What came back from the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single exchange. Connection-level failures map to
    /// [`ResilienceError::Transport`]; any HTTP status is a success here.
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ResilienceError>;
}

/// reqwest-backed transport carrying the pool and TLS settings.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ResilienceError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(config.pool.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool.idle_timeout_secs))
            .danger_accept_invalid_certs(config.tls.insecure_skip_verify);

        if let Some(identity) = load_identity(&config.tls)? {
            builder = builder.identity(identity);
        }
        if let Some(path) = &config.tls.ca_cert_path {
            let pem = read_pem(path)?;
            let ca = Certificate::from_pem(&pem)
                .map_err(|e| ResilienceError::InvalidConfiguration(format!("invalid CA certificate '{path}': {e}")))?;
            builder = builder.add_root_certificate(ca);
        }

        let client = builder
            .build()
            .map_err(|e| ResilienceError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;

        if config.tls.insecure_skip_verify {
            tracing::warn!("TLS certificate verification disabled");
        }

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ResilienceError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ResilienceError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| ResilienceError::Transport(format!("failed to read response body: {e}")))?
            .to_vec();

        Ok(RawResponse { status, headers, body })
    }
}

/// Lower-case names; repeated headers joined with ", ".
pub(crate) fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flat
}

fn load_identity(tls: &TlsConfig) -> Result<Option<Identity>, ResilienceError> {
    let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) else {
        return Ok(None);
    };

    let mut pem = read_pem(cert_path)?;
    pem.push(b'\n');
    pem.extend(read_pem(key_path)?);

    Identity::from_pem(&pem)
        .map(Some)
        .map_err(|e| ResilienceError::InvalidConfiguration(format!("invalid client certificate: {e}")))
}

fn read_pem(path: &str) -> Result<Vec<u8>, ResilienceError> {
    std::fs::read(path).map_err(|e| ResilienceError::InvalidConfiguration(format!("failed to read '{path}': {e}")))
}
