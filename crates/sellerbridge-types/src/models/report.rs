//! Aggregated health report for operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall system status derived from unacknowledged alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// No unacknowledged critical or emergency alerts
    Healthy,
    /// Unacknowledged warnings present
    Degraded,
    /// Unacknowledged critical or emergency alerts present
    Critical,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Human-readable health summary with remediation suggestions.
///
/// Operators consume this instead of raw exceptions or counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub status: OverallStatus,
    pub summary: String,
    pub suggestions: Vec<String>,
}
