//! Resilient HTTP client.
//!
//! Every request walks the same pipeline: correlation ID, rate limiter,
//! circuit breaker, then the retry loop around the transport. Metrics and the
//! completion log are written once per request with the final outcome.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{validate_config, ClientConfig};
use crate::error::ResilienceError;
use crate::http::request::{generate_correlation_id, Body, Request};
use crate::http::response::{status_error, Response};
use crate::http::transport::{HttpTransport, OutboundRequest, RawResponse, Transport};
use crate::observability::logging::preview_body;
use crate::observability::{MetricsCollector, MetricsSnapshot, Rejection};
use crate::resilience::circuit_breaker::{CallOutcome, CircuitBreaker, CircuitState, CircuitStats};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::{sleep_or_cancel, with_deadline};
use crate::security::rate_limit::RateLimiter;

/// Name of the breaker guarding a client's upstream.
pub const CLIENT_CIRCUIT_NAME: &str = "http_client";

/// Slack added to a request's deadline on top of its attempts and backoffs.
const REQUEST_BUDGET_MARGIN: Duration = Duration::from_secs(1);

/// HTTP client with rate limiting, circuit breaking and retries.
pub struct ResilientHttpClient {
    config: ClientConfig,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
    limiter: Option<RateLimiter>,
    metrics: Arc<MetricsCollector>,
}

impl fmt::Debug for ResilientHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientHttpClient")
            .field("base_url", &self.base_url)
            .field("retry_policy", &self.retry_policy)
            .field("breaker", &self.breaker)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl ResilientHttpClient {
    /// Build a client backed by reqwest.
    pub fn new(config: ClientConfig) -> Result<Self, ResilienceError> {
        check_config(&config)?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client over any transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ResilienceError> {
        check_config(&config)?;

        let base_url = config.base_url.as_deref().map(parse_base_url).transpose()?;
        let default_headers = build_default_headers(&config)?;
        let metrics = Arc::new(MetricsCollector::new(config.metrics.enabled));

        let breaker = if config.circuit_breaker.enabled {
            let breaker_config = config
                .circuit_breaker
                .to_breaker_config(&config.retries)
                .with_failure_predicate(is_failed_call);
            let sink = Arc::clone(&metrics);
            let breaker = CircuitBreaker::try_new(CLIENT_CIRCUIT_NAME, breaker_config)?
                .with_listener(Arc::new(move |name: &str, _from: CircuitState, to: CircuitState| {
                    sink.record_transition(name, to)
                }));
            Some(Arc::new(breaker))
        } else {
            None
        };

        let limiter = if config.rate_limit.enabled {
            Some(RateLimiter::from_config(&config.rate_limit)?)
        } else {
            None
        };

        tracing::debug!(
            base_url = ?config.base_url,
            circuit_breaker = config.circuit_breaker.enabled,
            rate_limit = config.rate_limit.enabled,
            max_retries = config.retries.max_retries,
            "HTTP client initialized"
        );

        Ok(Self {
            retry_policy: RetryPolicy::from_config(&config.retries),
            config,
            base_url,
            default_headers,
            transport,
            breaker,
            limiter,
            metrics,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    /// Stats of the client's breaker, when circuit breaking is enabled.
    pub fn circuit_stats(&self) -> Option<CircuitStats> {
        self.breaker.as_ref().map(|b| b.stats())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response, ResilienceError> {
        self.execute(Request::new(Method::GET, url)).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<Response, ResilienceError> {
        self.execute(Request::new(Method::DELETE, url)).await
    }

    pub async fn post(&self, url: impl Into<String>, body: impl Into<Body>) -> Result<Response, ResilienceError> {
        self.execute(Request::new(Method::POST, url).body(body)).await
    }

    pub async fn put(&self, url: impl Into<String>, body: impl Into<Body>) -> Result<Response, ResilienceError> {
        self.execute(Request::new(Method::PUT, url).body(body)).await
    }

    pub async fn patch(&self, url: impl Into<String>, body: impl Into<Body>) -> Result<Response, ResilienceError> {
        self.execute(Request::new(Method::PATCH, url).body(body)).await
    }

    /// Execute a request with no external cancellation.
    pub async fn execute(&self, request: Request) -> Result<Response, ResilienceError> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Execute a request; cancelling `cancel` aborts any wait, attempt or
    /// backoff with [`ResilienceError::Cancelled`].
    pub async fn execute_with_cancel(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, ResilienceError> {
        if self.config.correlation.enabled && request.correlation_id.is_none() {
            request.correlation_id = Some(generate_correlation_id());
        }
        let method = request.method.to_string();
        let correlation_id = request.correlation_id.clone().unwrap_or_default();

        if let Some(limiter) = &self.limiter {
            if let Err(err) = limiter.wait(cancel).await {
                if matches!(err, ResilienceError::RateLimitExceeded) {
                    self.metrics.record_rejection(&method, Rejection::RateLimited);
                }
                tracing::warn!(
                    correlation_id = %correlation_id,
                    method = %method,
                    url = %request.url,
                    error = %err,
                    "Request not admitted by rate limiter"
                );
                return Err(err);
            }
        }

        let started = Instant::now();
        let result = match &self.breaker {
            Some(breaker) => breaker
                .execute_with_timeout(
                    || self.send_with_retries(&request, cancel, started),
                    Some(self.request_budget(&request)),
                )
                .await
                .map_err(ResilienceError::from),
            None => self.send_with_retries(&request, cancel, started).await,
        };

        match &result {
            Ok(response) => {
                self.metrics.record_response(&method, response.status, response.duration);
                self.log_completion(response);
            }
            Err(ResilienceError::CircuitOpen { .. }) => {
                self.metrics.record_rejection(&method, Rejection::CircuitOpen);
                tracing::warn!(
                    correlation_id = %correlation_id,
                    method = %method,
                    url = %request.url,
                    "Request rejected by circuit breaker"
                );
            }
            Err(err) => {
                let elapsed = started.elapsed();
                self.metrics.record_error(&method, err, elapsed);
                if self.config.logging.enabled {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        method = %method,
                        url = %request.url,
                        error = %err,
                        duration_ms = elapsed.as_millis() as u64,
                        "Request failed"
                    );
                }
            }
        }

        result
    }

    async fn send_with_retries(
        &self,
        request: &Request,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<Response, ResilienceError> {
        let outbound = self.build_outbound(request)?;
        let max_retries = self.retry_policy.retries_for(request.max_retries);
        let attempt_timeout = request.timeout.unwrap_or_else(|| self.config.timeout());

        if self.config.logging.enabled && self.config.logging.log_request_body {
            if let Some(body) = &outbound.body {
                tracing::debug!(correlation_id = ?request.correlation_id, body = %preview_body(body), "Request body");
            }
        }

        let mut attempt = 0u32;
        loop {
            let result = with_deadline(attempt_timeout, cancel, self.transport.send(outbound.clone())).await;

            let retryable = match &result {
                Ok(raw) => self.retry_policy.is_retryable_status(raw.status),
                Err(err) => self.retry_policy.is_retryable_error(err),
            };
            if !retryable || attempt >= max_retries {
                let raw = result?;
                return Ok(self.build_response(request, raw, started.elapsed(), attempt));
            }

            let delay = self.retry_policy.backoff.delay(attempt);
            match &result {
                Ok(raw) => tracing::info!(
                    correlation_id = ?request.correlation_id,
                    attempt = attempt + 1,
                    max_retries,
                    status = raw.status,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request after retryable status"
                ),
                Err(err) => tracing::info!(
                    correlation_id = ?request.correlation_id,
                    attempt = attempt + 1,
                    max_retries,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request after error"
                ),
            }

            self.metrics.record_retry();
            sleep_or_cancel(delay, cancel).await?;
            attempt += 1;
        }
    }

    /// Deadline for the breaker call around one request: every attempt at its
    /// own timeout plus every backoff, so the last attempt always gets to finish.
    fn request_budget(&self, request: &Request) -> Duration {
        let retries = self.retry_policy.retries_for(request.max_retries);
        let attempt_timeout = request.timeout.unwrap_or_else(|| self.config.timeout());

        attempt_timeout
            .saturating_mul(retries.saturating_add(1))
            .saturating_add(self.retry_policy.backoff.max_total(retries))
            .saturating_add(REQUEST_BUDGET_MARGIN)
    }

    fn build_outbound(&self, request: &Request) -> Result<OutboundRequest, ResilienceError> {
        let mut url = self.resolve_url(&request.url)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut headers = self.default_headers.clone();
        self.config.auth.apply(&mut headers)?;
        for (name, value) in &request.headers {
            let (name, value) = parse_header(name, value).map_err(ResilienceError::InvalidRequest)?;
            headers.insert(name, value);
        }

        if self.config.correlation.enabled {
            if let Some(id) = &request.correlation_id {
                let (name, value) =
                    parse_header(&self.config.correlation.header_name, id).map_err(ResilienceError::InvalidRequest)?;
                headers.insert(name, value);
            }
        }

        let (body, content_type) = request.body.encode()?;
        if let Some(content_type) = content_type {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        Ok(OutboundRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Absolute URLs pass through; relative paths are appended to the base URL.
    fn resolve_url(&self, target: &str) -> Result<Url, ResilienceError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    ResilienceError::InvalidRequest(format!("relative URL '{target}' with no base_url configured"))
                })?;
                base.join(target.trim_start_matches('/'))
                    .map_err(|e| ResilienceError::InvalidRequest(format!("invalid URL '{target}': {e}")))
            }
            Err(e) => Err(ResilienceError::InvalidRequest(format!("invalid URL '{target}': {e}"))),
        }
    }

    fn build_response(&self, request: &Request, raw: RawResponse, duration: Duration, retry_count: u32) -> Response {
        Response {
            error: status_error(raw.status),
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            request: request.clone(),
            duration,
            retry_count,
            correlation_id: request.correlation_id.clone(),
        }
    }

    fn log_completion(&self, response: &Response) {
        let logging = &self.config.logging;
        if !logging.enabled {
            return;
        }

        tracing::info!(
            correlation_id = ?response.correlation_id,
            method = %response.request.method,
            url = %response.request.url,
            status = response.status,
            duration_ms = response.duration.as_millis() as u64,
            retry_count = response.retry_count,
            "Request completed"
        );
        if logging.log_response_body && !response.body.is_empty() {
            tracing::debug!(correlation_id = ?response.correlation_id, body = %preview_body(&response.body), "Response body");
        }
    }
}

/// Breaker classification for the client: errors other than cancellation,
/// and responses with a 5xx status, count as failures.
fn is_failed_call(outcome: &CallOutcome<'_>) -> bool {
    match outcome {
        CallOutcome::Success(value) => value
            .downcast_ref::<Response>()
            .is_some_and(|response| response.status >= 500),
        CallOutcome::Failure(err) => !matches!(
            err.downcast_ref::<ResilienceError>(),
            Some(ResilienceError::Cancelled)
        ),
        CallOutcome::TimedOut(_) => true,
    }
}

fn check_config(config: &ClientConfig) -> Result<(), ResilienceError> {
    validate_config(config).map_err(|errors| {
        let joined = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        ResilienceError::InvalidConfiguration(joined)
    })
}

fn parse_base_url(raw: &str) -> Result<Url, ResilienceError> {
    let mut url =
        Url::parse(raw).map_err(|e| ResilienceError::InvalidConfiguration(format!("invalid base_url '{raw}': {e}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn build_default_headers(config: &ClientConfig) -> Result<HeaderMap, ResilienceError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.default_headers {
        let (name, value) = parse_header(name, value).map_err(ResilienceError::InvalidConfiguration)?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), String> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| format!("invalid header name '{name}': {e}"))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| format!("invalid value for header '{name}': {e}"))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::auth::AuthConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replies with a fixed status and remembers what it was sent.
    struct FakeTransport {
        status: u16,
        calls: AtomicU32,
        delay: Option<Duration>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeTransport {
        fn replying(status: u16) -> Arc<Self> {
            Arc::new(Self {
                status,
                calls: AtomicU32::new(0),
                delay: None,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn stalling(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                status: 200,
                calls: AtomicU32::new(0),
                delay: Some(delay),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn last(&self) -> OutboundRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: OutboundRequest) -> Result<RawResponse, ResilienceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(RawResponse {
                status: self.status,
                headers: Default::default(),
                body: b"{}".to_vec(),
            })
        }
    }

    /// Fails the first `failures` calls at the connection level.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<RawResponse, ResilienceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ResilienceError::Transport("connection refused".to_string()));
            }
            Ok(RawResponse {
                status: 200,
                ..Default::default()
            })
        }
    }

    fn config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.base_url = Some("http://upstream.test/api".to_string());
        config
    }

    fn client(config: ClientConfig, transport: Arc<dyn Transport>) -> ResilientHttpClient {
        ResilientHttpClient::with_transport(config, transport).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_on_retryable_status() {
        let mut config = config();
        config.retries.max_retries = 3;
        config.circuit_breaker.enabled = false;
        let transport = FakeTransport::replying(503);
        let client = client(config, transport.clone());

        let response = client.get("/flaky").await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.retry_count, 3);
        assert_eq!(transport.calls(), 4);
        assert!(response.error.is_some());
        assert_eq!(client.metrics().retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_returns_immediately() {
        let transport = FakeTransport::replying(404);
        let client = client(config(), transport.clone());

        let response = client.get("/missing").await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.retry_count, 0);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried_until_success() {
        let transport = Arc::new(FlakyTransport {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let client = client(config(), transport.clone());

        let response = client.get("/eventually").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.retry_count, 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_transport_error_surfaces_after_exhaustion() {
        let mut config = config();
        config.retries.max_retries = 1;
        let transport = Arc::new(FlakyTransport {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let client = client(config, transport.clone());

        let err = client.get("/down").await.unwrap_err();

        assert_eq!(err, ResilienceError::Transport("connection refused".to_string()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_override_uses_larger_retry_count() {
        let mut config = config();
        config.retries.max_retries = 1;
        config.circuit_breaker.enabled = false;
        let transport = FakeTransport::replying(503);
        let client = client(config, transport.clone());

        let response = client.execute(Request::get("/x").max_retries(4)).await.unwrap();
        assert_eq!(response.retry_count, 4);
        assert_eq!(transport.calls(), 5);

        let response = client.execute(Request::get("/x").max_retries(0)).await.unwrap();
        assert_eq!(response.retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_transport() {
        let mut config = config();
        config.retries.max_retries = 0;
        config.circuit_breaker.failure_threshold = 2;
        let transport = FakeTransport::replying(500);
        let client = client(config, transport.clone());

        assert_eq!(client.get("/fail").await.unwrap().status, 500);
        assert_eq!(client.get("/fail").await.unwrap().status, 500);

        let err = client.get("/fail").await.unwrap_err();
        assert!(matches!(err, ResilienceError::CircuitOpen { .. }));
        assert_eq!(transport.calls(), 2);

        let stats = client.circuit_stats().unwrap();
        assert_eq!(stats.state, CircuitState::Open);
        let metrics = client.metrics();
        assert_eq!(metrics.circuit_rejections, 1);
        assert_eq!(metrics.circuit_transitions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rejection_does_not_touch_breaker() {
        let mut config = config();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1.0;
        config.rate_limit.burst = 1;
        let transport = FakeTransport::replying(200);
        let client = client(config, transport.clone());

        client.get("/a").await.unwrap();
        assert!(client.rate_limiter().unwrap().available_tokens() < 1.0);

        // Both wait one interval; the single refilled token admits only one.
        let concurrent = {
            let cancel = CancellationToken::new();
            let first = client.execute_with_cancel(Request::get("/b"), &cancel);
            let second = client.execute_with_cancel(Request::get("/c"), &cancel);
            tokio::join!(first, second)
        };

        let outcomes = [concurrent.0, concurrent.1];
        let rejected = outcomes
            .iter()
            .filter(|r| matches!(r, Err(ResilienceError::RateLimitExceeded)))
            .count();
        assert_eq!(rejected, 1);

        let stats = client.circuit_stats().unwrap();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.rejected_count, 0);
        assert_eq!(client.metrics().rate_limit_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_breaker_failure() {
        let mut config = config();
        config.retries.max_retries = 0;
        config.timeout_ms = 50;
        let transport = FakeTransport::stalling(Duration::from_secs(5));
        let client = client(config, transport.clone());

        let err = client.get("/slow").await.unwrap_err();

        assert_eq!(err, ResilienceError::Timeout(Duration::from_millis(50)));
        let stats = client.circuit_stats().unwrap();
        assert_eq!(stats.total_failures, 1);
        assert_eq!(client.metrics().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_request_timeout_is_not_cut_by_breaker() {
        let mut config = config();
        config.retries.max_retries = 0;
        config.circuit_breaker.call_timeout_ms = 120_000;
        let transport = FakeTransport::stalling(Duration::from_secs(150));
        let client = client(config, transport.clone());

        let response = client
            .execute(Request::get("/slow").timeout(Duration::from_secs(200)))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upstream_surfaces_last_attempt_timeout() {
        let transport = FakeTransport::stalling(Duration::from_secs(10_000));
        let client = client(config(), transport.clone());

        let err = client.get("/hang").await.unwrap_err();

        assert_eq!(err, ResilienceError::Timeout(Duration::from_secs(30)));
        assert_eq!(transport.calls(), 4);
        assert_eq!(client.metrics().retries, 3);
        assert_eq!(client.circuit_stats().unwrap().total_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_not_a_breaker_failure() {
        let transport = FakeTransport::stalling(Duration::from_secs(5));
        let client = client(config(), transport.clone());
        let cancel = CancellationToken::new();

        let request = client.execute_with_cancel(Request::get("/slow"), &cancel);
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(request, canceller);

        assert_eq!(result.unwrap_err(), ResilienceError::Cancelled);
        let stats = client.circuit_stats().unwrap();
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_outbound_request_composition() {
        let mut config = config();
        config.default_headers.insert("User-Agent".to_string(), "resilient-http-test".to_string());
        config.auth = AuthConfig::Bearer {
            token: "secret".to_string(),
        };
        let transport = FakeTransport::replying(201);
        let client = client(config, transport.clone());

        let request = Request::post("/items")
            .query("dry run", "yes & no")
            .json(&serde_json::json!({"name": "widget"}))
            .unwrap()
            .correlation_id("corr-1");
        let response = client.execute(request).await.unwrap();

        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.url.as_str(), "http://upstream.test/api/items?dry+run=yes+%26+no");
        assert_eq!(sent.headers["authorization"], "Bearer secret");
        assert_eq!(sent.headers["user-agent"], "resilient-http-test");
        assert_eq!(sent.headers["content-type"], "application/json");
        assert_eq!(sent.headers["x-correlation-id"], "corr-1");
        assert_eq!(sent.body.as_deref(), Some(&br#"{"name":"widget"}"#[..]));

        assert_eq!(response.status, 201);
        assert_eq!(response.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(response.request.url, "/items");
    }

    #[tokio::test]
    async fn test_correlation_id_generated_when_missing() {
        let transport = FakeTransport::replying(200);
        let client = client(config(), transport.clone());

        let response = client.get("http://other.test/ping").await.unwrap();

        let id = response.correlation_id.clone().unwrap();
        assert_eq!(transport.last().headers["x-correlation-id"], id.as_str());
        assert_eq!(transport.last().url.as_str(), "http://other.test/ping");
    }

    #[tokio::test]
    async fn test_relative_url_without_base_is_rejected() {
        let mut config = config();
        config.base_url = None;
        let transport = FakeTransport::replying(200);
        let client = client(config, transport.clone());

        let err = client.get("/users").await.unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidRequest(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.retries.backoff_multiplier = 0.5;

        let err = ResilientHttpClient::with_transport(config, FakeTransport::replying(200)).unwrap_err();
        assert!(matches!(err, ResilienceError::InvalidConfiguration(_)));
    }
}
