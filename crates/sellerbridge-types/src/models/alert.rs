//! Operational alerts raised by the resilience monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity level of an operational alert.
///
/// Ordering matters: `Emergency > Critical > Warning > Info`, used when
/// deriving the overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
            AlertSeverity::Emergency => write!(f, "emergency"),
        }
    }
}

/// A single operational alert.
///
/// At most one unacknowledged alert may exist per (component, severity)
/// pair within the dedup window; creation-time deduplication enforces this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    /// Component that triggered the alert (e.g. "breakers", "webhook")
    pub component: String,
    pub message: String,
    /// Rule-specific context (observed values, thresholds)
    pub metadata: serde_json::Value,
    pub acknowledged: bool,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        component: impl Into<String>,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            component: component.into(),
            message: message.into(),
            metadata,
            acknowledged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Emergency > AlertSeverity::Critical);
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }

    #[test]
    fn test_alert_starts_unacknowledged() {
        let alert = Alert::new(
            AlertSeverity::Warning,
            "webhook",
            "average response time above budget",
            serde_json::json!({"avg_ms": 612}),
        );
        assert!(!alert.acknowledged);
        assert_eq!(alert.component, "webhook");
    }
}
