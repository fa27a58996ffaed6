//! Circuit breaker for per-operation fast-fail behavior.
//!
//! Prevents repeated calls into a failing upstream endpoint or tenant.
//! When an operation class accumulates failures past its thresholds the
//! circuit opens and subsequent requests fail fast without touching the
//! upstream.
//!
//! States:
//! - Closed: normal operation, requests pass through
//! - Open: operation class is failing, requests fail immediately
//! - Half-Open: testing whether the operation class has recovered
//!
//! The Open→Half-Open transition is lazy: it happens on the call path by
//! comparing against the recovery deadline, not via a per-breaker timer.
//! Rolling-counter resets for idle breakers run on one shared registry
//! sweep instead.

mod registry;
mod state;


pub use registry::{CircuitBreakerRegistry, RegistrySummary};
pub use state::{BreakerEvent, CircuitConfig, CircuitState, CircuitStatsView};

use state::CircuitStats;

use parking_lot::Mutex;
use sellerbridge_types::{ResilienceError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

struct CircuitInner {
    state: CircuitState,
    stats: CircuitStats,
    last_request_at: Option<Instant>,
    window_started_at: Instant,
}

/// A single-operation failure-isolating state machine.
///
/// All counters mutate only under this breaker's own lock; no lock is
/// shared across breakers and none is held across an `.await`.
pub struct CircuitBreaker {
    config: CircuitConfig,
    inner: Mutex<CircuitInner>,
    total_trips: AtomicU64,
    events: Option<broadcast::Sender<BreakerEvent>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        Self::with_events(config, None)
    }

    pub(crate) fn with_events(
        config: CircuitConfig,
        events: Option<broadcast::Sender<BreakerEvent>>,
    ) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                stats: CircuitStats::default(),
                last_request_at: None,
                window_started_at: Instant::now(),
            }),
            total_trips: AtomicU64::new(0),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Execute an operation under breaker protection.
    ///
    /// While open, rejects with [`ResilienceError::CircuitOpen`] without
    /// invoking the operation. Failure classification is supplied by the
    /// error type itself: only errors whose `should_trip_circuit()` is
    /// true charge the failure counters; everything else passes through
    /// as a neutral outcome.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(),
            Err(e) if e.should_trip_circuit() => self.record_failure(&e.to_string()),
            Err(_) => {}
        }

        result
    }

    /// Execute with an explicit time budget.
    ///
    /// Exceeding the budget counts as a breaker failure and surfaces as
    /// [`ResilienceError::OperationTimeout`].
    pub async fn execute_with_timeout<T, F, Fut>(&self, budget: Duration, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget_ms = budget.as_millis() as u64;
        self.execute(|| async move {
            match tokio::time::timeout(budget, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ResilienceError::OperationTimeout { budget_ms }),
            }
        })
        .await
    }

    /// Admission check: counts the request and enforces the open state.
    fn admit(&self) -> Result<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let deadline = inner.stats.next_attempt_at;
            match deadline {
                Some(at) if now >= at => {
                    debug!(circuit = %self.config.name, "circuit transitioning to half-open");
                    inner.stats.half_open_probes = 0;
                    self.transition(&mut inner, CircuitState::HalfOpen, "recovery timeout elapsed");
                }
                _ => {
                    inner.stats.rejections += 1;
                    let retry_in_ms = deadline
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64)
                        .unwrap_or_else(|| self.config.open_timeout.as_millis() as u64);
                    return Err(ResilienceError::CircuitOpen {
                        name: self.config.name.clone(),
                        retry_in_ms,
                    });
                }
            }
        }

        inner.stats.total_requests += 1;
        inner.last_request_at = Some(now);
        Ok(())
    }

    fn record_success(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.stats.successes += 1;
        inner.stats.last_success_at = Some(now);

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.stats.half_open_probes += 1;
                if inner.stats.half_open_probes >= self.config.success_threshold {
                    info!(circuit = %self.config.name, "circuit closing - operation recovered");
                    inner.stats.failures = 0;
                    inner.stats.half_open_probes = 0;
                    inner.stats.next_attempt_at = None;
                    self.transition(&mut inner, CircuitState::Closed, "recovery confirmed");
                }
            }
            CircuitState::Open => {
                debug!(circuit = %self.config.name, "unexpected success in open state");
            }
        }
    }

    fn record_failure(&self, reason: &str) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.stats.failures += 1;
        inner.stats.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                let stats = &inner.stats;
                let volume_met = stats.total_requests >= self.config.volume_threshold;
                let count_tripped = stats.failures >= u64::from(self.config.failure_threshold);
                let rate_tripped = stats.error_percentage() >= self.config.error_threshold_percentage;

                if volume_met && (count_tripped || rate_tripped) {
                    warn!(
                        circuit = %self.config.name,
                        failures = stats.failures,
                        total = stats.total_requests,
                        reason = %reason,
                        "circuit opening - failure thresholds exceeded"
                    );
                    inner.stats.next_attempt_at = Some(now + self.config.open_timeout);
                    self.total_trips.fetch_add(1, Ordering::Relaxed);
                    self.transition(&mut inner, CircuitState::Open, reason);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    circuit = %self.config.name,
                    reason = %reason,
                    "circuit re-opening - failure during half-open probe"
                );
                inner.stats.half_open_probes = 0;
                inner.stats.next_attempt_at = Some(now + self.config.open_timeout);
                self.total_trips.fetch_add(1, Ordering::Relaxed);
                self.transition(&mut inner, CircuitState::Open, reason);
            }
            CircuitState::Open => {}
        }
    }

    /// Reset idle rolling counters; called by the registry's shared sweep.
    ///
    /// An open breaker with no traffic for a full window is nudged to
    /// half-open: silence is cause to re-probe.
    pub fn maybe_reset_window(&self, now: Instant) {
        let mut inner = self.inner.lock();

        let idle_since = inner.last_request_at.unwrap_or(inner.window_started_at);
        if now.saturating_duration_since(idle_since) < self.config.stats_reset_interval {
            return;
        }

        inner.stats.reset_window();
        inner.window_started_at = now;

        if inner.state == CircuitState::Open {
            debug!(circuit = %self.config.name, "idle window elapsed while open, probing");
            inner.stats.half_open_probes = 0;
            self.transition(&mut inner, CircuitState::HalfOpen, "idle window elapsed");
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn total_trips(&self) -> u64 {
        self.total_trips.load(Ordering::Relaxed)
    }

    /// Snapshot of the breaker's counters for dashboards and the monitor.
    pub fn stats(&self) -> CircuitStatsView {
        let now = Instant::now();
        let inner = self.inner.lock();
        CircuitStatsView {
            name: self.config.name.clone(),
            state: inner.state,
            failures: inner.stats.failures,
            successes: inner.stats.successes,
            rejections: inner.stats.rejections,
            total_requests: inner.stats.total_requests,
            half_open_probes: inner.stats.half_open_probes,
            error_rate_percent: inner.stats.error_percentage(),
            total_trips: self.total_trips.load(Ordering::Relaxed),
            retry_in_ms: match inner.state {
                CircuitState::Open => inner
                    .stats
                    .next_attempt_at
                    .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                _ => None,
            },
        }
    }

    /// Manual operator reset: closed state, all counters at zero.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        inner.stats = CircuitStats::default();
        inner.last_request_at = None;
        inner.window_started_at = Instant::now();
        if previous != CircuitState::Closed {
            info!(circuit = %self.config.name, previous_state = %previous, "circuit reset manually");
            self.transition(&mut inner, CircuitState::Closed, "manual reset");
        }
    }

    /// Force a specific state (ops/test hook).
    pub fn force_state(&self, state: CircuitState) {
        let mut inner = self.inner.lock();
        if inner.state == state {
            return;
        }
        if state == CircuitState::Open {
            inner.stats.next_attempt_at = Some(Instant::now() + self.config.open_timeout);
        } else {
            inner.stats.next_attempt_at = None;
            inner.stats.half_open_probes = 0;
        }
        self.transition(&mut inner, state, "forced");
    }

    fn transition(&self, inner: &mut CircuitInner, to: CircuitState, reason: &str) {
        let from = inner.state;
        inner.state = to;
        crate::telemetry::record_breaker_transition(&self.config.name, to);
        if let Some(events) = &self.events {
            let _ = events.send(BreakerEvent {
                name: self.config.name.clone(),
                from,
                to,
                reason: reason.to_string(),
            });
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
