//! Health report generation.

use chrono::Utc;
use sellerbridge_types::{AlertSeverity, HealthReport, MetricsSnapshot, OverallStatus};

use super::alerts::AlertBook;

/// Derive the operator-facing report from the latest snapshot and the
/// alert book. Operators see this, never raw errors.
pub fn build_health_report(snapshot: Option<&MetricsSnapshot>, alerts: &AlertBook) -> HealthReport {
    let status = match alerts.highest_active_severity() {
        Some(severity) if severity >= AlertSeverity::Critical => OverallStatus::Critical,
        Some(_) => OverallStatus::Degraded,
        None => OverallStatus::Healthy,
    };

    let summary = snapshot.map_or_else(
        || "no metrics collected yet".to_string(),
        |snap| {
            let counts = alerts.counts();
            format!(
                "{} breakers open, {}/{} tenants failed, webhook avg {:.0}ms, {} active alerts ({} critical)",
                snap.breakers.open,
                snap.tenants.failed,
                snap.tenants.total(),
                snap.webhook.avg_response_time_ms,
                counts.active,
                counts.critical,
            )
        },
    );

    let mut suggestions = Vec::new();
    for (component, severity) in alerts.active_components() {
        let suggestion = match (component.as_str(), severity) {
            ("breakers", AlertSeverity::Emergency) => {
                "Aggregate upstream error rate is critical: consider pausing outbound traffic"
            }
            ("breakers", _) => "Investigate upstream services causing circuit breakers to open",
            ("tenants", _) => "Review failing tenant integrations and refresh their credentials",
            ("webhook", AlertSeverity::Critical) => {
                "Emergency buffering is elevated: check durable queue health and backlog"
            }
            ("webhook", _) => "Webhook processing is slow: check tenant lookup and queue latency",
            _ => "Inspect recent alerts for details",
        };
        if !suggestions.contains(&suggestion.to_string()) {
            suggestions.push(suggestion.to_string());
        }
    }
    if suggestions.is_empty() {
        suggestions.push("No action needed".to_string());
    }

    HealthReport { generated_at: Utc::now(), status, summary, suggestions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_follows_alert_severity() {
        let alerts = AlertBook::new();
        assert_eq!(build_health_report(None, &alerts).status, OverallStatus::Healthy);

        alerts.raise(AlertSeverity::Warning, "webhook", "slow", json!({}));
        assert_eq!(build_health_report(None, &alerts).status, OverallStatus::Degraded);

        alerts.raise(AlertSeverity::Critical, "breakers", "open", json!({}));
        assert_eq!(build_health_report(None, &alerts).status, OverallStatus::Critical);
    }

    #[test]
    fn test_suggestions_mention_open_breakers() {
        let alerts = AlertBook::new();
        alerts.raise(AlertSeverity::Critical, "breakers", "2 circuits open", json!({}));

        let report = build_health_report(None, &alerts);
        assert!(report.suggestions.iter().any(|s| s.contains("circuit breakers")));
    }

    #[test]
    fn test_acknowledged_alerts_restore_health() {
        let alerts = AlertBook::new();
        let id = alerts
            .raise(AlertSeverity::Critical, "breakers", "open", json!({}))
            .expect("alert");
        alerts.acknowledge(id);

        assert_eq!(build_health_report(None, &alerts).status, OverallStatus::Healthy);
    }
}
