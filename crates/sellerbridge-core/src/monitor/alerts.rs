//! Alert book with creation-time deduplication.

use chrono::Utc;
use parking_lot::Mutex;
use sellerbridge_types::{Alert, AlertCounts, AlertSeverity};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

/// No second unacknowledged alert of the same (component, severity) within
/// this many seconds.
const DEDUP_WINDOW_SECS: i64 = 300;

/// Retained alerts, acknowledged ones included.
const MAX_ALERTS: usize = 500;

/// Bounded alert store.
#[derive(Debug, Default)]
pub struct AlertBook {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise an alert unless an unacknowledged one with the same
    /// (component, severity) already exists within the dedup window.
    ///
    /// Returns the new alert's id, or `None` when deduplicated.
    pub fn raise(
        &self,
        severity: AlertSeverity,
        component: &str,
        message: impl Into<String>,
        metadata: Value,
    ) -> Option<Uuid> {
        let mut alerts = self.alerts.lock();

        let cutoff = Utc::now() - chrono::Duration::seconds(DEDUP_WINDOW_SECS);
        let duplicate = alerts.iter().any(|a| {
            !a.acknowledged && a.component == component && a.severity == severity && a.timestamp > cutoff
        });
        if duplicate {
            return None;
        }

        let alert = Alert::new(severity, component, message, metadata);
        let id = alert.id;
        match severity {
            AlertSeverity::Critical | AlertSeverity::Emergency => {
                warn!(component = %component, severity = %severity, message = %alert.message, "alert raised");
            }
            _ => {
                info!(component = %component, severity = %severity, message = %alert.message, "alert raised");
            }
        }
        alerts.push(alert);

        if alerts.len() > MAX_ALERTS {
            let excess = alerts.len() - MAX_ALERTS;
            alerts.drain(..excess);
        }
        Some(id)
    }

    /// Acknowledge an alert by id. Returns false for unknown ids.
    pub fn acknowledge(&self, id: Uuid) -> bool {
        let mut alerts = self.alerts.lock();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                info!(alert_id = %id, component = %alert.component, "alert acknowledged");
                true
            }
            None => false,
        }
    }

    /// Unacknowledged alerts, newest first.
    pub fn active(&self) -> Vec<Alert> {
        let alerts = self.alerts.lock();
        let mut active: Vec<_> = alerts.iter().filter(|a| !a.acknowledged).cloned().collect();
        active.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        active
    }

    pub fn counts(&self) -> AlertCounts {
        let alerts = self.alerts.lock();
        let active = alerts.iter().filter(|a| !a.acknowledged).count();
        let critical = alerts
            .iter()
            .filter(|a| !a.acknowledged && a.severity >= AlertSeverity::Critical)
            .count();
        AlertCounts { active, critical, acknowledged: alerts.len() - active }
    }

    /// Highest unacknowledged severity, if any alert is active.
    pub fn highest_active_severity(&self) -> Option<AlertSeverity> {
        self.alerts.lock().iter().filter(|a| !a.acknowledged).map(|a| a.severity).max()
    }

    /// Active alerts for one component (used by report suggestions).
    pub fn active_components(&self) -> Vec<(String, AlertSeverity)> {
        self.active().into_iter().map(|a| (a.component, a.severity)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_breach_twice_yields_one_alert() {
        let book = AlertBook::new();

        let first = book.raise(AlertSeverity::Critical, "breakers", "2 circuits open", json!({}));
        let second = book.raise(AlertSeverity::Critical, "breakers", "2 circuits open", json!({}));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(book.active().len(), 1);
    }

    #[test]
    fn test_different_severity_is_not_deduplicated() {
        let book = AlertBook::new();

        book.raise(AlertSeverity::Warning, "webhook", "slow", json!({}));
        book.raise(AlertSeverity::Critical, "webhook", "very slow", json!({}));

        assert_eq!(book.active().len(), 2);
    }

    #[test]
    fn test_acknowledge_frees_the_slot() {
        let book = AlertBook::new();
        let id = book
            .raise(AlertSeverity::Warning, "tenants", "failure rate high", json!({}))
            .expect("first alert");

        assert!(book.acknowledge(id));
        let second = book.raise(AlertSeverity::Warning, "tenants", "failure rate high", json!({}));
        assert!(second.is_some());

        let counts = book.counts();
        assert_eq!(counts.active, 1);
        assert_eq!(counts.acknowledged, 1);
    }

    #[test]
    fn test_acknowledge_unknown_id() {
        let book = AlertBook::new();
        assert!(!book.acknowledge(Uuid::new_v4()));
    }

    #[test]
    fn test_highest_active_severity() {
        let book = AlertBook::new();
        assert!(book.highest_active_severity().is_none());

        book.raise(AlertSeverity::Warning, "webhook", "slow", json!({}));
        book.raise(AlertSeverity::Emergency, "breakers", "everything is on fire", json!({}));

        assert_eq!(book.highest_active_severity(), Some(AlertSeverity::Emergency));
    }
}
