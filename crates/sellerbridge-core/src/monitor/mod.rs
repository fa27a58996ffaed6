//! Resilience monitor: periodic metrics collection, alert evaluation and
//! health reporting.
//!
//! The monitor is a pure read path over the registry, the tenant
//! processor and the webhook pipeline. It never influences request
//! handling; operators observe alerts and a health report instead of raw
//! errors.

pub mod alerts;
pub mod report;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use alerts::AlertBook;
pub use snapshot::{ResourceSampler, SnapshotHistory, DEFAULT_HISTORY_CAP};

use chrono::Utc;
use sellerbridge_types::{Alert, AlertSeverity, BreakerCounts, HealthReport, MetricsSnapshot};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::breaker::CircuitBreakerRegistry;
use crate::tenants::TenantProcessor;
use crate::webhook::WebhookPipeline;

/// Tenant failed share above which the tenant-population alert fires.
const TENANT_FAILURE_RATE: f64 = 0.30;

/// Webhook average response time above which the latency alert fires.
const WEBHOOK_AVG_RESPONSE_MS: f64 = 500.0;

/// Emergency-diversion share of received events above which the
/// diversion alert fires.
const EMERGENCY_DIVERSION_RATE: f64 = 0.10;

/// Aggregate breaker error rate above which the emergency alert fires.
const AGGREGATE_ERROR_RATE_PERCENT: f64 = 50.0;

/// Monitor loop configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub collection_interval: Duration,
    pub alert_interval: Duration,
    pub history_cap: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(10),
            alert_interval: Duration::from_secs(30),
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// Observes all resilience components on an independent read path.
pub struct ResilienceMonitor {
    registry: Arc<CircuitBreakerRegistry>,
    processor: Arc<TenantProcessor>,
    pipeline: Arc<WebhookPipeline>,
    history: SnapshotHistory,
    alerts: AlertBook,
    sampler: ResourceSampler,
    config: MonitorConfig,
}

impl ResilienceMonitor {
    pub fn new(
        registry: Arc<CircuitBreakerRegistry>,
        processor: Arc<TenantProcessor>,
        pipeline: Arc<WebhookPipeline>,
    ) -> Self {
        Self::with_config(registry, processor, pipeline, MonitorConfig::default())
    }

    pub fn with_config(
        registry: Arc<CircuitBreakerRegistry>,
        processor: Arc<TenantProcessor>,
        pipeline: Arc<WebhookPipeline>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            processor,
            pipeline,
            history: SnapshotHistory::new(config.history_cap),
            alerts: AlertBook::new(),
            sampler: ResourceSampler::new(),
            config,
        }
    }

    /// Take one snapshot of the whole layer and append it to history.
    pub fn collect(&self) -> MetricsSnapshot {
        let registry = self.registry.summary();
        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            breakers: BreakerCounts {
                closed: registry.closed,
                open: registry.open,
                half_open: registry.half_open,
                total_trips: registry.total_trips,
                error_rate_percent: registry.error_rate_percent,
            },
            tenants: self.processor.counts(),
            webhook: self.pipeline.counters(),
            resources: self.sampler.sample(),
            alerts: self.alerts.counts(),
        };
        self.history.push(snapshot.clone());
        snapshot
    }

    /// Evaluate every alert rule independently against the latest snapshot.
    pub fn evaluate_alerts(&self) {
        let Some(snapshot) = self.history.latest() else {
            return;
        };

        if snapshot.breakers.open >= 2 {
            self.alerts.raise(
                AlertSeverity::Critical,
                "breakers",
                format!("{} circuit breakers open simultaneously", snapshot.breakers.open),
                json!({ "open": snapshot.breakers.open }),
            );
        }

        let tenant_total = snapshot.tenants.total();
        if tenant_total > 0 {
            let failed_rate = snapshot.tenants.failed as f64 / tenant_total as f64;
            if failed_rate > TENANT_FAILURE_RATE {
                self.alerts.raise(
                    AlertSeverity::Warning,
                    "tenants",
                    format!("{}/{} tenants failed", snapshot.tenants.failed, tenant_total),
                    json!({ "failed": snapshot.tenants.failed, "total": tenant_total }),
                );
            }
        }

        if snapshot.webhook.avg_response_time_ms > WEBHOOK_AVG_RESPONSE_MS {
            self.alerts.raise(
                AlertSeverity::Warning,
                "webhook",
                format!(
                    "webhook average response time {:.0}ms exceeds budget",
                    snapshot.webhook.avg_response_time_ms
                ),
                json!({ "avg_response_time_ms": snapshot.webhook.avg_response_time_ms }),
            );
        }

        if snapshot.webhook.received > 0 {
            let diversion_rate =
                snapshot.webhook.emergency_diversions as f64 / snapshot.webhook.received as f64;
            if diversion_rate > EMERGENCY_DIVERSION_RATE {
                self.alerts.raise(
                    AlertSeverity::Critical,
                    "webhook",
                    format!("{:.0}% of webhooks diverted to the emergency buffer", diversion_rate * 100.0),
                    json!({
                        "emergency_diversions": snapshot.webhook.emergency_diversions,
                        "received": snapshot.webhook.received
                    }),
                );
            }
        }

        if snapshot.breakers.error_rate_percent > AGGREGATE_ERROR_RATE_PERCENT {
            self.alerts.raise(
                AlertSeverity::Emergency,
                "breakers",
                format!(
                    "aggregate breaker error rate {:.0}% exceeds emergency threshold",
                    snapshot.breakers.error_rate_percent
                ),
                json!({ "error_rate_percent": snapshot.breakers.error_rate_percent }),
            );
        }
    }

    /// Latest snapshot, collecting one on demand if none exists yet.
    pub fn current_metrics(&self) -> MetricsSnapshot {
        self.history.latest().unwrap_or_else(|| self.collect())
    }

    /// Most recent snapshots, oldest first.
    pub fn history(&self, limit: usize) -> Vec<MetricsSnapshot> {
        self.history.list(limit)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.active()
    }

    pub fn acknowledge_alert(&self, id: Uuid) -> bool {
        self.alerts.acknowledge(id)
    }

    pub fn health_report(&self) -> HealthReport {
        report::build_health_report(self.history.latest().as_ref(), &self.alerts)
    }

    /// Spawn the collection and alert-evaluation loops.
    pub fn start(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let collector = {
            let monitor = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(monitor.config.collection_interval) => {
                            monitor.collect();
                        }
                        _ = shutdown.changed() => {
                            info!("metrics collection loop shutting down");
                            break;
                        }
                    }
                }
            })
        };

        let evaluator = {
            let monitor = Arc::clone(self);
            let mut shutdown = shutdown;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = tokio::time::sleep(monitor.config.alert_interval) => {
                            monitor.evaluate_alerts();
                        }
                        _ = shutdown.changed() => {
                            info!("alert evaluation loop shutting down");
                            break;
                        }
                    }
                }
            })
        };

        (collector, evaluator)
    }
}
