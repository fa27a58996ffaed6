//! Per-tenant health tracking.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use crate::breaker::CircuitState;

/// EWMA smoothing factor for error rate and response time.
const EWMA_ALPHA: f64 = 0.2;

/// Error-rate percentage above which a closed-circuit tenant reads as
/// degraded. Deliberately separate from the breaker's
/// `error_threshold_percentage`: this knob drives UX-visible status, the
/// breaker's drives the hard circuit cut-off.
pub const DEGRADED_ERROR_RATE_PERCENT: f64 = 30.0;

/// Derived status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Circuit closed and error rate within bounds
    Healthy,
    /// Circuit half-open, or closed with an elevated error rate
    Degraded,
    /// Circuit open
    Failed,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantStatus::Healthy => write!(f, "healthy"),
            TenantStatus::Degraded => write!(f, "degraded"),
            TenantStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Derive tenant status from the breaker state and the EWMA error rate.
///
/// The breaker state is delegated, never duplicated: an open circuit IS
/// the failed status.
pub fn derive_status(circuit: CircuitState, error_rate_percent: f64) -> TenantStatus {
    match circuit {
        CircuitState::Open => TenantStatus::Failed,
        CircuitState::HalfOpen => TenantStatus::Degraded,
        CircuitState::Closed => {
            if error_rate_percent > DEGRADED_ERROR_RATE_PERCENT {
                TenantStatus::Degraded
            } else {
                TenantStatus::Healthy
            }
        }
    }
}

#[derive(Debug)]
struct Ewma {
    error_rate_percent: f64,
    avg_response_time_ms: f64,
}

/// Health record for a single tenant.
///
/// Created on the tenant's first operation, updated on every operation
/// and by the health-check sweep, removed only by explicit manual reset.
#[derive(Debug)]
pub struct TenantHealth {
    pub tenant_id: String,
    consecutive_failures: AtomicU32,
    ewma: Mutex<Ewma>,
    last_checked_at: Mutex<Instant>,
}

impl TenantHealth {
    pub fn new(tenant_id: String) -> Self {
        Self {
            tenant_id,
            consecutive_failures: AtomicU32::new(0),
            ewma: Mutex::new(Ewma { error_rate_percent: 0.0, avg_response_time_ms: 0.0 }),
            last_checked_at: Mutex::new(Instant::now()),
        }
    }

    /// Record one operation outcome.
    pub fn record_outcome(&self, ok: bool, elapsed: Duration) {
        if ok {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        }

        let sample = if ok { 0.0 } else { 100.0 };
        let elapsed_ms = elapsed.as_millis() as f64;
        let mut ewma = self.ewma.lock();
        ewma.error_rate_percent =
            EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * ewma.error_rate_percent;
        ewma.avg_response_time_ms =
            EWMA_ALPHA * elapsed_ms + (1.0 - EWMA_ALPHA) * ewma.avg_response_time_ms;
        *self.last_checked_at.lock() = Instant::now();
    }

    /// Record a probe failure: counts consecutive failures, nothing else.
    pub fn record_probe_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        *self.last_checked_at.lock() = Instant::now();
    }

    /// Mark the tenant recovered: counters and rates back to zero.
    pub fn mark_recovered(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut ewma = self.ewma.lock();
        ewma.error_rate_percent = 0.0;
        *self.last_checked_at.lock() = Instant::now();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn error_rate_percent(&self) -> f64 {
        self.ewma.lock().error_rate_percent
    }

    pub fn avg_response_time_ms(&self) -> f64 {
        self.ewma.lock().avg_response_time_ms
    }

    pub fn checked_within(&self, window: Duration) -> bool {
        self.last_checked_at.lock().elapsed() < window
    }

    pub fn last_checked_secs_ago(&self) -> u64 {
        self.last_checked_at.lock().elapsed().as_secs()
    }

    pub fn touch(&self) {
        *self.last_checked_at.lock() = Instant::now();
    }
}

/// Serializable tenant health view for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct TenantHealthReport {
    pub tenant_id: String,
    pub status: TenantStatus,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub error_rate_percent: f64,
    pub avg_response_time_ms: f64,
    pub last_checked_secs_ago: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_delegates_to_circuit_state() {
        assert_eq!(derive_status(CircuitState::Open, 0.0), TenantStatus::Failed);
        assert_eq!(derive_status(CircuitState::HalfOpen, 0.0), TenantStatus::Degraded);
        assert_eq!(derive_status(CircuitState::Closed, 0.0), TenantStatus::Healthy);
    }

    #[test]
    fn test_elevated_error_rate_degrades_closed_tenant() {
        assert_eq!(derive_status(CircuitState::Closed, 30.1), TenantStatus::Degraded);
        assert_eq!(derive_status(CircuitState::Closed, 30.0), TenantStatus::Healthy);
    }

    #[test]
    fn test_ewma_moves_toward_failures() {
        let health = TenantHealth::new("t1".to_string());
        assert_eq!(health.error_rate_percent(), 0.0);

        health.record_outcome(false, Duration::from_millis(100));
        // 0.2 * 100 + 0.8 * 0 = 20
        assert!((health.error_rate_percent() - 20.0).abs() < 1e-9);

        health.record_outcome(true, Duration::from_millis(50));
        // 0.2 * 0 + 0.8 * 20 = 16
        assert!((health.error_rate_percent() - 16.0).abs() < 1e-9);
        assert_eq!(health.consecutive_failures(), 0);
    }
}
