//! Circuit breaker state types and configuration.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Name used in logs, events and rejection errors
    pub name: String,
    /// Failures in the rolling window before opening the circuit
    pub failure_threshold: u32,
    /// Successful probes in half-open state required to close the circuit
    pub success_threshold: u32,
    /// Duration to keep the circuit open before probing recovery
    #[serde(with = "duration_ms")]
    pub open_timeout: Duration,
    /// Minimum requests in the window before the trip condition is evaluated
    pub volume_threshold: u64,
    /// Failure percentage in the window that opens the circuit
    pub error_threshold_percentage: f64,
    /// Idle time after which rolling counters reset (shared sweep)
    #[serde(with = "duration_ms")]
    pub stats_reset_interval: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            volume_threshold: 10,
            error_threshold_percentage: 50.0,
            stats_reset_interval: Duration::from_secs(60),
        }
    }
}

impl CircuitConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Operation class is failing - requests fail immediately
    Open,
    /// Testing recovery - probes allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Rolling statistics owned exclusively by one breaker.
///
/// Counters reset when the idle window elapses; timestamps survive resets.
#[derive(Debug)]
pub(crate) struct CircuitStats {
    pub failures: u64,
    pub successes: u64,
    pub rejections: u64,
    pub total_requests: u64,
    pub last_failure_at: Option<Instant>,
    pub last_success_at: Option<Instant>,
    /// Set only while open; cleared on close
    pub next_attempt_at: Option<Instant>,
    pub half_open_probes: u32,
}

impl Default for CircuitStats {
    fn default() -> Self {
        Self {
            failures: 0,
            successes: 0,
            rejections: 0,
            total_requests: 0,
            last_failure_at: None,
            last_success_at: None,
            next_attempt_at: None,
            half_open_probes: 0,
        }
    }
}

impl CircuitStats {
    /// Failure percentage over the rolling window, 0.0 when empty.
    pub fn error_percentage(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.total_requests as f64 * 100.0
        }
    }

    /// Reset rolling counters, keeping timestamps and the open deadline.
    pub fn reset_window(&mut self) {
        self.failures = 0;
        self.successes = 0;
        self.rejections = 0;
        self.total_requests = 0;
    }
}

/// Read-only snapshot of a breaker's state and counters.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatsView {
    pub name: String,
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    pub rejections: u64,
    pub total_requests: u64,
    pub half_open_probes: u32,
    pub error_rate_percent: f64,
    pub total_trips: u64,
    /// Milliseconds until the next recovery probe, while open
    pub retry_in_ms: Option<u64>,
}

/// Published on every state transition.
///
/// The bus is a bounded broadcast channel: lagging subscribers lose old
/// events instead of growing the queue.
#[derive(Debug, Clone)]
pub struct BreakerEvent {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
