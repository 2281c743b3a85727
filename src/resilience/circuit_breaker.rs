//! Circuit breaker for protecting fallible operations.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call at or after opened_at + open_timeout (lazy, no timer)
//! Half-Open → Closed: successes >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - One lock per breaker; observers take the read side
//! - The lock is never held across the protected operation
//! - Outcome classification is injected through predicates on the config
//! - Rejected calls are never retried here; retrying is the caller's job

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ResilienceError;
use crate::resilience::backoff::Backoff;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// What a protected call produced, as seen by the classification predicates.
pub enum CallOutcome<'a> {
    /// The operation returned a value.
    Success(&'a dyn Any),
    /// The operation returned an error.
    Failure(&'a (dyn std::error::Error + 'static)),
    /// The per-call deadline fired before the operation returned.
    TimedOut(Duration),
}

/// Classifies a call outcome. Held by value in the config so every breaker
/// can carry its own policy.
pub type OutcomePredicate = Arc<dyn Fn(&CallOutcome<'_>) -> bool + Send + Sync>;

/// Notified after every state transition with `(name, from, to)`.
pub type StateChangeListener = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Breaker thresholds, timeouts and classification policy.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// Successes in Half-Open that close the circuit.
    pub success_threshold: u32,
    /// Time spent Open before a trial call is admitted.
    pub open_timeout: Duration,
    /// Deadline applied to trial calls while Half-Open.
    pub half_open_timeout: Duration,
    /// Default deadline for a protected call.
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff_delay: Duration,
    /// Overrides "any error or timeout is a failure".
    pub failure_predicate: Option<OutcomePredicate>,
    /// Overrides "any returned value is a success".
    pub success_predicate: Option<OutcomePredicate>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            half_open_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff_delay: Duration::from_secs(10),
            failure_predicate: None,
            success_predicate: None,
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("open_timeout", &self.open_timeout)
            .field("half_open_timeout", &self.half_open_timeout)
            .field("call_timeout", &self.call_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_backoff_delay", &self.max_backoff_delay)
            .field("failure_predicate", &self.failure_predicate.is_some())
            .field("success_predicate", &self.success_predicate.is_some())
            .finish()
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallOutcome<'_>) -> bool + Send + Sync + 'static,
    {
        self.failure_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_success_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallOutcome<'_>) -> bool + Send + Sync + 'static,
    {
        self.success_predicate = Some(Arc::new(predicate));
        self
    }

    /// Backoff schedule described by the retry fields.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.retry_base_delay, self.backoff_multiplier, self.max_backoff_delay)
    }

    /// Reject configurations the state machine cannot honour.
    pub fn validate(&self) -> Result<(), ResilienceError> {
        let mut problems = Vec::new();
        if self.failure_threshold == 0 {
            problems.push("failure_threshold must be at least 1");
        }
        if self.success_threshold == 0 {
            problems.push("success_threshold must be at least 1");
        }
        if self.call_timeout.is_zero() {
            problems.push("call_timeout must be greater than zero");
        }
        if self.half_open_timeout.is_zero() {
            problems.push("half_open_timeout must be greater than zero");
        }
        if !(self.backoff_multiplier >= 1.0) {
            problems.push("backoff_multiplier must be >= 1.0");
        }
        if self.retry_base_delay > self.max_backoff_delay {
            problems.push("retry_base_delay must not exceed max_backoff_delay");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ResilienceError::InvalidConfiguration(problems.join(", ")))
        }
    }

    fn is_failure(&self, outcome: &CallOutcome<'_>) -> bool {
        match &self.failure_predicate {
            Some(predicate) => predicate(outcome),
            None => !matches!(outcome, CallOutcome::Success(_)),
        }
    }

    fn is_success(&self, outcome: &CallOutcome<'_>) -> bool {
        match &self.success_predicate {
            Some(predicate) => predicate(outcome),
            None => matches!(outcome, CallOutcome::Success(_)),
        }
    }
}

/// Errors returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the operation was not invoked.
    #[error("circuit breaker '{name}' is open")]
    Rejected { name: String },

    /// The operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation's own error, passed through unchanged.
    #[error("{0}")]
    Inner(E),

    /// The background task ended without reporting an outcome.
    #[error("async execution aborted before completion")]
    Aborted,
}

impl<E> CircuitBreakerError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitBreakerError::Rejected { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CircuitBreakerError<ResilienceError>> for ResilienceError {
    fn from(err: CircuitBreakerError<ResilienceError>) -> Self {
        match err {
            CircuitBreakerError::Rejected { name } => ResilienceError::CircuitOpen { name },
            CircuitBreakerError::Timeout(limit) => ResilienceError::Timeout(limit),
            CircuitBreakerError::Inner(inner) => inner,
            CircuitBreakerError::Aborted => {
                ResilienceError::Operation("async execution aborted before completion".to_string())
            }
        }
    }
}

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    /// Admitted calls since creation or the last reset.
    pub request_count: u64,
    /// Current-window failures (consecutive in Closed, reset on Half-Open entry).
    pub failure_count: u64,
    /// Current-window successes (reset on Half-Open entry and on closing).
    pub success_count: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    /// Calls rejected while Open.
    pub rejected_count: u64,
    pub last_failure_time: Option<SystemTime>,
    pub last_request_time: Option<SystemTime>,
    pub state_change_time: SystemTime,
    /// Percentage of admitted calls classified as failures.
    pub failure_rate: f64,
    /// Percentage of admitted calls classified as successes.
    pub success_rate: f64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    request_count: u64,
    total_failures: u64,
    total_successes: u64,
    rejected_count: u64,
    half_open_in_flight: u32,
    /// Monotonic stamp of the last transition, drives Open → Half-Open.
    changed_at: Instant,
    state_change_time: SystemTime,
    last_failure_time: Option<SystemTime>,
    last_request_time: Option<SystemTime>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            request_count: 0,
            total_failures: 0,
            total_successes: 0,
            rejected_count: 0,
            half_open_in_flight: 0,
            changed_at: Instant::now(),
            state_change_time: SystemTime::now(),
            last_failure_time: None,
            last_request_time: None,
        }
    }
}

/// Admission ticket for one call.
#[derive(Debug, Clone, Copy)]
struct Permit {
    trial: bool,
}

enum Verdict {
    Failure,
    Success,
    Neutral,
}

/// A three-state breaker guarding one named operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerState>,
    listener: Option<StateChangeListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker in the Closed state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        tracing::debug!(
            circuit = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            open_timeout_ms = config.open_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: RwLock::new(BreakerState::new()),
            listener: None,
        }
    }

    /// Validate the config before building the breaker.
    pub fn try_new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self, ResilienceError> {
        config.validate()?;
        Ok(Self::new(name, config))
    }

    /// Attach a transition listener.
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state as last recorded. An expired Open is still reported as
    /// Open until the next call attempt moves it to Half-Open.
    pub fn state(&self) -> CircuitState {
        self.read().state
    }

    /// True when the breaker is Closed.
    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.read();
        let (failure_rate, success_rate) = if inner.request_count > 0 {
            let total = inner.request_count as f64;
            (
                inner.total_failures as f64 / total * 100.0,
                inner.total_successes as f64 / total * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        CircuitStats {
            name: self.name.clone(),
            state: inner.state,
            request_count: inner.request_count,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            rejected_count: inner.rejected_count,
            last_failure_time: inner.last_failure_time,
            last_request_time: inner.last_request_time,
            state_change_time: inner.state_change_time,
            failure_rate,
            success_rate,
        }
    }

    /// Run `operation` under the breaker with the configured call timeout.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: std::error::Error + 'static,
    {
        self.execute_with_timeout(operation, None).await
    }

    /// Run `operation` under the breaker, overriding the call timeout when given.
    pub async fn execute_with_timeout<F, Fut, T, E>(
        &self,
        operation: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: std::error::Error + 'static,
    {
        let permit = self.admit().ok_or_else(|| CircuitBreakerError::Rejected {
            name: self.name.clone(),
        })?;

        let mut limit = timeout.unwrap_or(self.config.call_timeout);
        if permit.trial {
            limit = limit.min(self.config.half_open_timeout);
        }

        match tokio::time::timeout(limit, operation()).await {
            Ok(Ok(value)) => {
                let verdict = self.classify(&CallOutcome::Success(&value));
                self.record(permit, verdict);
                Ok(value)
            }
            Ok(Err(err)) => {
                let verdict = self.classify(&CallOutcome::Failure(&err));
                self.record(permit, verdict);
                Err(CircuitBreakerError::Inner(err))
            }
            Err(_) => {
                tracing::warn!(circuit = %self.name, timeout_ms = limit.as_millis() as u64, "Protected call timed out");
                let verdict = self.classify(&CallOutcome::TimedOut(limit));
                self.record(permit, verdict);
                Err(CircuitBreakerError::Timeout(limit))
            }
        }
    }

    /// Run `operation` on a spawned task and hand back a handle to its result.
    ///
    /// Once spawned the operation runs to completion and its outcome is
    /// recorded even if the handle is dropped or the wait times out; only the
    /// wait can be abandoned.
    pub fn execute_async<F, Fut, T, E>(self: &Arc<Self>, operation: F) -> ExecuteHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let breaker = Arc::clone(self);

        tokio::spawn(async move {
            let result = breaker.execute(operation).await;
            if tx.send(result).is_err() {
                tracing::debug!(circuit = %breaker.name, "Async result dropped, no waiter");
            }
        });

        ExecuteHandle { rx }
    }

    /// Open the circuit regardless of counters.
    pub fn force_open(&self) {
        tracing::warn!(circuit = %self.name, "Circuit breaker forced open");
        let transition = {
            let mut inner = self.write();
            self.transition(&mut inner, CircuitState::Open)
        };
        self.notify(transition);
    }

    /// Close the circuit and clear the window counters.
    pub fn force_close(&self) {
        tracing::warn!(circuit = %self.name, "Circuit breaker forced closed");
        let transition = {
            let mut inner = self.write();
            let transition = self.transition(&mut inner, CircuitState::Closed);
            inner.failure_count = 0;
            inner.success_count = 0;
            transition
        };
        self.notify(transition);
    }

    /// Close the circuit and wipe every counter and timestamp.
    pub fn reset(&self) {
        tracing::info!(circuit = %self.name, "Circuit breaker reset");
        let transition = {
            let mut inner = self.write();
            let from = inner.state;
            *inner = BreakerState::new();
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        self.notify(transition);
    }

    fn admit(&self) -> Option<Permit> {
        let (permit, transition) = {
            let mut inner = self.write();
            let mut transition = None;

            if inner.state == CircuitState::Open {
                if inner.changed_at.elapsed() >= self.config.open_timeout {
                    transition = self.transition(&mut inner, CircuitState::HalfOpen);
                } else {
                    inner.rejected_count += 1;
                    tracing::debug!(circuit = %self.name, "Circuit open, rejecting call");
                    return None;
                }
            }

            let trial = inner.state == CircuitState::HalfOpen;
            if trial {
                if inner.half_open_in_flight >= self.config.success_threshold {
                    inner.rejected_count += 1;
                    drop(inner);
                    self.notify(transition);
                    return None;
                }
                inner.half_open_in_flight += 1;
            }

            inner.request_count += 1;
            inner.last_request_time = Some(SystemTime::now());
            (Permit { trial }, transition)
        };

        self.notify(transition);
        Some(permit)
    }

    fn classify(&self, outcome: &CallOutcome<'_>) -> Verdict {
        if self.config.is_failure(outcome) {
            Verdict::Failure
        } else if self.config.is_success(outcome) {
            Verdict::Success
        } else {
            Verdict::Neutral
        }
    }

    fn record(&self, permit: Permit, verdict: Verdict) {
        let transition = {
            let mut inner = self.write();
            if permit.trial && inner.state == CircuitState::HalfOpen {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            }

            match verdict {
                Verdict::Success => self.on_success(&mut inner),
                Verdict::Failure => self.on_failure(&mut inner),
                Verdict::Neutral => None,
            }
        };
        self.notify(transition);
    }

    fn on_success(&self, inner: &mut BreakerState) -> Option<(CircuitState, CircuitState)> {
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count += 1;
                None
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= u64::from(self.config.success_threshold) {
                    let transition = self.transition(inner, CircuitState::Closed);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    transition
                } else {
                    None
                }
            }
            // A call admitted before a forced open; counted, no transition.
            CircuitState::Open => None,
        }
    }

    fn on_failure(&self, inner: &mut BreakerState) -> Option<(CircuitState, CircuitState)> {
        inner.total_failures += 1;
        inner.last_failure_time = Some(SystemTime::now());

        match inner.state {
            CircuitState::Closed => {
                inner.success_count = 0;
                inner.failure_count += 1;
                if inner.failure_count >= u64::from(self.config.failure_threshold) {
                    self.transition(inner, CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.failure_count += 1;
                self.transition(inner, CircuitState::Open)
            }
            CircuitState::Open => {
                inner.failure_count += 1;
                None
            }
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
        let from = inner.state;
        inner.state = to;
        inner.changed_at = Instant::now();
        inner.state_change_time = SystemTime::now();
        inner.half_open_in_flight = 0;

        if to == CircuitState::HalfOpen {
            inner.failure_count = 0;
            inner.success_count = 0;
        }

        match to {
            CircuitState::Open => tracing::warn!(
                circuit = %self.name,
                from = %from,
                failure_count = inner.failure_count,
                failure_threshold = self.config.failure_threshold,
                open_timeout_ms = self.config.open_timeout.as_millis() as u64,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                circuit = %self.name,
                success_threshold = self.config.success_threshold,
                "Circuit breaker half-open, admitting trial calls"
            ),
            CircuitState::Closed => tracing::info!(
                circuit = %self.name,
                from = %from,
                total_requests = inner.request_count,
                "Circuit breaker closed"
            ),
        }

        (from != to).then_some((from, to))
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        if let (Some((from, to)), Some(listener)) = (transition, &self.listener) {
            listener(&self.name, from, to);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BreakerState> {
        self.inner.read().expect("circuit breaker lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BreakerState> {
        self.inner.write().expect("circuit breaker lock poisoned")
    }
}

/// Handle to an operation started with [`CircuitBreaker::execute_async`].
#[derive(Debug)]
pub struct ExecuteHandle<T, E> {
    rx: oneshot::Receiver<Result<T, CircuitBreakerError<E>>>,
}

impl<T, E> ExecuteHandle<T, E> {
    /// Wait for the operation's outcome.
    pub async fn wait(self) -> Result<T, CircuitBreakerError<E>> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(CircuitBreakerError::Aborted),
        }
    }

    /// Wait at most `limit`. On expiry the operation keeps running in the
    /// background and its outcome is no longer observable.
    pub async fn wait_timeout(self, limit: Duration) -> Result<T, CircuitBreakerError<E>> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(CircuitBreakerError::Timeout(limit)),
        }
    }
}
