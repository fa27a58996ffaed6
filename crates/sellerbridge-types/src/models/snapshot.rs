//! Periodic metrics snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Breaker population counts by state, plus lifetime trips.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakerCounts {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_trips: u64,
    /// Aggregate failure percentage across all breakers' rolling windows
    pub error_rate_percent: f64,
}

/// Tenant population counts by derived status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub failed: usize,
}

impl TenantCounts {
    pub const fn total(&self) -> usize {
        self.healthy + self.degraded + self.failed
    }
}

/// Webhook pipeline throughput and latency counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WebhookCounters {
    pub received: u64,
    pub duplicates: u64,
    pub emergency_diversions: u64,
    pub flushed: u64,
    pub dropped: u64,
    pub avg_response_time_ms: f64,
    pub buffer_depth: usize,
}

/// Process resource usage at snapshot time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// Alert book counters at snapshot time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertCounts {
    pub active: usize,
    pub critical: usize,
    pub acknowledged: usize,
}

/// One immutable observation of the whole resilience layer.
///
/// Appended to a bounded history ring; oldest entries are dropped once the
/// ring is full.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub breakers: BreakerCounts,
    pub tenants: TenantCounts,
    pub webhook: WebhookCounters,
    pub resources: ResourceUsage,
    pub alerts: AlertCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_counts_total() {
        let counts = TenantCounts { healthy: 7, degraded: 2, failed: 1 };
        assert_eq!(counts.total(), 10);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            breakers: BreakerCounts { closed: 4, open: 1, half_open: 0, total_trips: 3, error_rate_percent: 12.5 },
            tenants: TenantCounts { healthy: 9, degraded: 1, failed: 0 },
            webhook: WebhookCounters { received: 100, duplicates: 8, ..Default::default() },
            resources: ResourceUsage::default(),
            alerts: AlertCounts::default(),
        };

        let json = serde_json::to_string(&snapshot).expect("serialize");
        let back: MetricsSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(snapshot, back);
    }
}
