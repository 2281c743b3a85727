//! Registry of named circuit breakers.
//!
//! # Responsibilities
//! - Create, look up, remove and reset breakers by unique name
//! - Aggregate stats and health across every breaker
//! - Run one periodic monitor task that surfaces unhealthy circuits
//!
//! # Design Decisions
//! - Explicit owned registry, no global state
//! - Check-then-insert happens under the write lock
//! - The monitor holds a weak reference so it never keeps the manager alive

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;
use crate::observability::metrics::record_circuit_state;
use crate::resilience::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats, StateChangeListener,
};

/// Aggregate health across all registered breakers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub total: usize,
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }
}

struct Monitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns a set of breakers keyed by name.
pub struct CircuitBreakerManager {
    circuits: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    monitor_interval: Duration,
    listener: Option<StateChangeListener>,
    monitor: Mutex<Option<Monitor>>,
    last_report: Mutex<Option<HealthReport>>,
}

impl std::fmt::Debug for CircuitBreakerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerManager")
            .field("circuits", &self.circuit_names())
            .field("default_config", &self.default_config)
            .field("monitor_interval", &self.monitor_interval)
            .finish()
    }
}

impl CircuitBreakerManager {
    /// Fails when the default config is invalid or the monitor interval is zero.
    pub fn new(
        default_config: CircuitBreakerConfig,
        monitor_interval: Duration,
    ) -> Result<Self, ResilienceError> {
        default_config.validate()?;
        if monitor_interval.is_zero() {
            return Err(ResilienceError::InvalidConfiguration(
                "monitor_interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            circuits: RwLock::new(HashMap::new()),
            default_config,
            monitor_interval,
            listener: None,
            monitor: Mutex::new(None),
            last_report: Mutex::new(None),
        })
    }

    /// Attach a listener to every breaker this manager creates from now on.
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Register a new breaker. Fails if the name is taken or the config is invalid.
    pub fn create_circuit(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<Arc<CircuitBreaker>, ResilienceError> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        config.validate()?;

        let mut circuits = self.write();
        if circuits.contains_key(name) {
            return Err(ResilienceError::CircuitAlreadyExists(name.to_string()));
        }

        let breaker = Arc::new(self.build(name, config));
        circuits.insert(name.to_string(), Arc::clone(&breaker));
        tracing::info!(circuit = %name, total = circuits.len(), "Circuit breaker registered");
        Ok(breaker)
    }

    pub fn get_circuit(&self, name: &str) -> Result<Arc<CircuitBreaker>, ResilienceError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| ResilienceError::CircuitNotFound(name.to_string()))
    }

    /// Existing breaker, or a new one with the default config.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.read().get(name) {
            return Arc::clone(existing);
        }

        let mut circuits = self.write();
        let breaker = circuits
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(self.build(name, self.default_config.clone())));
        Arc::clone(breaker)
    }

    pub fn remove_circuit(&self, name: &str) -> Result<Arc<CircuitBreaker>, ResilienceError> {
        let removed = self
            .write()
            .remove(name)
            .ok_or_else(|| ResilienceError::CircuitNotFound(name.to_string()))?;
        tracing::info!(circuit = %name, "Circuit breaker removed");
        Ok(removed)
    }

    pub fn reset_circuit(&self, name: &str) -> Result<(), ResilienceError> {
        self.get_circuit(name)?.reset();
        Ok(())
    }

    pub fn force_open(&self, name: &str) -> Result<(), ResilienceError> {
        self.get_circuit(name)?.force_open();
        Ok(())
    }

    pub fn force_close(&self, name: &str) -> Result<(), ResilienceError> {
        self.get_circuit(name)?.force_close();
        Ok(())
    }

    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
    }

    /// Registered names, sorted.
    pub fn circuit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self, name: &str) -> Result<CircuitStats, ResilienceError> {
        Ok(self.get_circuit(name)?.stats())
    }

    pub fn all_stats(&self) -> BTreeMap<String, CircuitStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    pub fn health_report(&self) -> HealthReport {
        let mut report = HealthReport::default();
        for (name, stats) in self.all_stats() {
            report.total += 1;
            match stats.state {
                CircuitState::Closed => {
                    report.closed += 1;
                    report.healthy.push(name);
                }
                CircuitState::Open => {
                    report.open += 1;
                    report.unhealthy.push(name);
                }
                CircuitState::HalfOpen => {
                    report.half_open += 1;
                    report.unhealthy.push(name);
                }
            }
        }
        report
    }

    /// Spawn the periodic monitor. A running monitor is left as is.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut slot = self.monitor.lock().expect("monitor mutex poisoned");
        if slot.as_ref().is_some_and(|m| !m.handle.is_finished()) {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_monitor(
            Arc::downgrade(self),
            self.monitor_interval,
            token.clone(),
        ));
        *slot = Some(Monitor { token, handle });
    }

    /// Cancel the monitor and wait for it to exit. Safe to call repeatedly.
    pub async fn stop_monitoring(&self) {
        let monitor = self.monitor.lock().expect("monitor mutex poisoned").take();
        if let Some(monitor) = monitor {
            monitor.token.cancel();
            if let Err(e) = monitor.handle.await {
                tracing::warn!(error = %e, "Circuit monitor task ended abnormally");
            }
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .expect("monitor mutex poisoned")
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// Report written by the most recent [`check_all`](Self::check_all).
    pub fn last_report(&self) -> Option<HealthReport> {
        self.last_report.lock().expect("report mutex poisoned").clone()
    }

    /// One monitor pass: publish every breaker's state gauge, warn about each
    /// circuit that is not Closed, and keep the report for [`last_report`](Self::last_report).
    pub fn check_all(&self) -> HealthReport {
        let report = self.health_report();
        for breaker in self.snapshot() {
            let stats = breaker.stats();
            record_circuit_state(&stats.name, stats.state);
            if stats.state != CircuitState::Closed {
                tracing::warn!(
                    circuit = %stats.name,
                    state = %stats.state,
                    failure_count = stats.failure_count,
                    failure_rate = stats.failure_rate,
                    rejected = stats.rejected_count,
                    "Circuit unhealthy"
                );
            }
        }
        tracing::debug!(total = report.total, open = report.open, half_open = report.half_open, "Circuit monitor tick");
        *self.last_report.lock().expect("report mutex poisoned") = Some(report.clone());
        report
    }

    fn build(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        let breaker = CircuitBreaker::new(name, config);
        match &self.listener {
            Some(listener) => breaker.with_listener(Arc::clone(listener)),
            None => breaker,
        }
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.read().values().cloned().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.circuits.read().expect("circuit registry lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.circuits.write().expect("circuit registry lock poisoned")
    }
}

impl Drop for CircuitBreakerManager {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.monitor.lock() {
            if let Some(monitor) = slot.take() {
                monitor.token.cancel();
            }
        }
    }
}

async fn run_monitor(manager: Weak<CircuitBreakerManager>, interval: Duration, token: CancellationToken) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Circuit monitor starting");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("Circuit monitor cancelled, exiting loop");
                break;
            }
            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.check_all();
            }
        }
    }
}
