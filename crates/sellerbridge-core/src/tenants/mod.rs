//! Multi-tenant isolation processor.
//!
//! Runs operations across N seller tenants while keeping each tenant
//! behind its own circuit breaker: one tenant's failures never consume
//! another tenant's concurrency or trip another tenant's circuit.
//!
//! A background health-check sweep probes stale tenants and auto-recovers
//! the ones whose probe succeeds while their circuit is open.

pub mod health;

#[cfg(test)]
mod tests;

pub use health::{derive_status, TenantHealth, TenantHealthReport, TenantStatus};

use async_trait::async_trait;
use dashmap::DashMap;
use sellerbridge_types::{ResilienceError, Result, TenantCounts};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::breaker::CircuitBreakerRegistry;
use crate::telemetry;

/// Bounded capacity of the batch-summary event bus.
const BATCH_EVENT_CAPACITY: usize = 16;

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct TenantProcessorConfig {
    /// Refuse to even attempt operations for tenants already known failed
    pub isolation_enabled: bool,
    /// Default worker-pool size for batch processing
    pub concurrency_limit: usize,
    /// How often the health sweep probes stale tenants
    pub health_check_interval: Duration,
    /// Budget for one probe call
    pub probe_timeout: Duration,
}

impl Default for TenantProcessorConfig {
    fn default() -> Self {
        Self {
            isolation_enabled: true,
            concurrency_limit: 10,
            health_check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-batch overrides for [`TenantProcessor::run_for_all`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency_limit: Option<usize>,
    pub continue_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { concurrency_limit: None, continue_on_error: true }
    }
}

/// Collected results of one batch run. No cross-tenant ordering guarantee:
/// results land as each tenant's operation completes.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<(String, ResilienceError)>,
    pub skipped: Vec<String>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self { succeeded: Vec::new(), failed: Vec::new(), skipped: Vec::new() }
    }
}

/// Emitted when a batch completes.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

/// One lightweight call answering "is this tenant's integration alive".
#[async_trait]
pub trait TenantProbe: Send + Sync {
    async fn probe(&self, tenant_id: &str) -> Result<()>;
}

enum TaskOutcome<T> {
    Success(T),
    Failed(ResilienceError),
    Skipped,
}

/// Fan-out executor with per-tenant breaker isolation.
pub struct TenantProcessor {
    registry: Arc<CircuitBreakerRegistry>,
    health: DashMap<String, Arc<TenantHealth>>,
    config: TenantProcessorConfig,
    batch_events: broadcast::Sender<BatchSummary>,
}

impl TenantProcessor {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self::with_config(registry, TenantProcessorConfig::default())
    }

    pub fn with_config(registry: Arc<CircuitBreakerRegistry>, config: TenantProcessorConfig) -> Self {
        let (batch_events, _) = broadcast::channel(BATCH_EVENT_CAPACITY);
        Self { registry, health: DashMap::new(), config, batch_events }
    }

    fn health_entry(&self, tenant_id: &str) -> Arc<TenantHealth> {
        self.health
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(TenantHealth::new(tenant_id.to_string())))
            .clone()
    }

    /// Current derived status of a tenant.
    pub fn status_of(&self, tenant_id: &str) -> TenantStatus {
        let error_rate = self
            .health
            .get(tenant_id)
            .map_or(0.0, |h| h.error_rate_percent());
        derive_status(self.registry.tenant(tenant_id).state(), error_rate)
    }

    fn is_isolated(&self, tenant_id: &str) -> bool {
        self.config.isolation_enabled && self.status_of(tenant_id) == TenantStatus::Failed
    }

    /// Run one operation for one tenant under its breaker.
    ///
    /// Isolation mode: a tenant already known failed short-circuits to the
    /// fallback (or an [`ResilienceError::IsolationSkip`]) without invoking
    /// the operation or the breaker, so a known-bad tenant never consumes
    /// capacity.
    pub async fn run_for_tenant<T, F, Fut>(
        &self,
        tenant_id: &str,
        operation: F,
        fallback: Option<T>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let health = self.health_entry(tenant_id);
        let breaker = self.registry.tenant(tenant_id);

        if self.config.isolation_enabled
            && derive_status(breaker.state(), health.error_rate_percent()) == TenantStatus::Failed
        {
            debug!(tenant_id = %tenant_id, "tenant isolated, skipping operation");
            return fallback.map_or_else(
                || Err(ResilienceError::IsolationSkip { tenant_id: tenant_id.to_string() }),
                Ok,
            );
        }

        let started = Instant::now();
        let result = breaker.execute(operation).await;
        health.record_outcome(result.is_ok(), started.elapsed());

        match result {
            Ok(value) => Ok(value),
            Err(err) => fallback.map_or(Err(err), |value| {
                warn!(tenant_id = %tenant_id, "operation failed, serving tenant fallback");
                Ok(value)
            }),
        }
    }

    /// Run one operation across many tenants with a bounded worker pool.
    ///
    /// Individual failures collect into `failed` instead of aborting the
    /// batch while `continue_on_error` holds; with it off, the first
    /// failure stops admitting further tenants (in-flight ones complete).
    pub async fn run_for_all<T, F, Fut>(
        self: &Arc<Self>,
        tenant_ids: &[String],
        operation: F,
        options: BatchOptions,
    ) -> BatchOutcome<T>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let started = Instant::now();
        let limit = options.concurrency_limit.unwrap_or(self.config.concurrency_limit).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let operation = Arc::new(operation);
        let aborted = Arc::new(AtomicBool::new(false));

        let mut outcome = BatchOutcome::default();
        let mut tasks = tokio::task::JoinSet::new();

        for tenant_id in tenant_ids {
            // Pre-admission isolation check: a known-bad tenant must not
            // consume a worker slot.
            if self.is_isolated(tenant_id) {
                debug!(tenant_id = %tenant_id, "tenant isolated, skipped before admission");
                outcome.skipped.push(tenant_id.clone());
                continue;
            }

            let processor = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let operation = Arc::clone(&operation);
            let aborted = Arc::clone(&aborted);
            let continue_on_error = options.continue_on_error;
            let tenant_id = tenant_id.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (tenant_id, TaskOutcome::Skipped);
                };
                if aborted.load(Ordering::SeqCst) {
                    return (tenant_id, TaskOutcome::Skipped);
                }

                let result = processor
                    .run_for_tenant(&tenant_id, || operation(tenant_id.clone()), None)
                    .await;
                match result {
                    Ok(value) => (tenant_id, TaskOutcome::Success(value)),
                    Err(ResilienceError::IsolationSkip { .. }) => (tenant_id, TaskOutcome::Skipped),
                    Err(err) => {
                        if !continue_on_error {
                            aborted.store(true, Ordering::SeqCst);
                        }
                        (tenant_id, TaskOutcome::Failed(err))
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((tenant_id, TaskOutcome::Success(value))) => {
                    outcome.succeeded.push((tenant_id, value));
                }
                Ok((tenant_id, TaskOutcome::Failed(err))) => outcome.failed.push((tenant_id, err)),
                Ok((tenant_id, TaskOutcome::Skipped)) => outcome.skipped.push(tenant_id),
                Err(join_err) => error!(error = %join_err, "batch tenant task panicked"),
            }
        }

        let summary = BatchSummary {
            total: tenant_ids.len(),
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            skipped: outcome.skipped.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "tenant batch complete"
        );
        telemetry::record_tenant_batch("success", summary.succeeded as u64);
        telemetry::record_tenant_batch("failed", summary.failed as u64);
        telemetry::record_tenant_batch("skipped", summary.skipped as u64);
        let _ = self.batch_events.send(summary);

        outcome
    }

    /// Subscribe to batch-summary events.
    pub fn subscribe_batches(&self) -> broadcast::Receiver<BatchSummary> {
        self.batch_events.subscribe()
    }

    /// Probe stale tenants once; auto-recover the ones that answer while
    /// their circuit is open.
    pub async fn run_health_sweep(&self, probe: &dyn TenantProbe) {
        let interval = self.config.health_check_interval;
        let stale: Vec<String> = self
            .health
            .iter()
            .filter(|entry| !entry.value().checked_within(interval))
            .map(|entry| entry.key().clone())
            .collect();

        for tenant_id in stale {
            let Some(health) = self.health.get(&tenant_id).map(|e| Arc::clone(e.value())) else {
                continue;
            };
            let breaker = self.registry.tenant(&tenant_id);
            let was_failed =
                derive_status(breaker.state(), health.error_rate_percent()) == TenantStatus::Failed;

            match tokio::time::timeout(self.config.probe_timeout, probe.probe(&tenant_id)).await {
                Ok(Ok(())) => {
                    if was_failed {
                        info!(tenant_id = %tenant_id, "probe succeeded for failed tenant, auto-recovering");
                        breaker.reset();
                        health.mark_recovered();
                    } else {
                        health.touch();
                    }
                }
                // Probe failures only count; the open circuit already
                // governs rejection.
                Ok(Err(_)) | Err(_) => health.record_probe_failure(),
            }
        }
    }

    /// Spawn the periodic health-check sweep.
    pub fn start_health_sweep(
        self: &Arc<Self>,
        probe: Arc<dyn TenantProbe>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let processor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(processor.config.health_check_interval) => {
                        processor.run_health_sweep(probe.as_ref()).await;
                    }
                    _ = shutdown.changed() => {
                        info!("tenant health sweep shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Manual operator reset: drops the health record and the tenant's
    /// breaker entirely.
    pub fn reset_tenant(&self, tenant_id: &str) {
        info!(tenant_id = %tenant_id, "tenant reset manually");
        self.health.remove(tenant_id);
        self.registry.remove_tenant(tenant_id);
    }

    /// Serializable health views for the dashboard.
    pub fn all_health(&self) -> Vec<TenantHealthReport> {
        let mut reports: Vec<_> = self
            .health
            .iter()
            .map(|entry| {
                let health = entry.value();
                let circuit_state = self.registry.tenant(entry.key()).state();
                TenantHealthReport {
                    tenant_id: entry.key().clone(),
                    status: derive_status(circuit_state, health.error_rate_percent()),
                    circuit_state,
                    consecutive_failures: health.consecutive_failures(),
                    error_rate_percent: health.error_rate_percent(),
                    avg_response_time_ms: health.avg_response_time_ms(),
                    last_checked_secs_ago: health.last_checked_secs_ago(),
                }
            })
            .collect();
        reports.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        reports
    }

    /// Tenant population counts for snapshots.
    pub fn counts(&self) -> TenantCounts {
        let mut counts = TenantCounts::default();
        for entry in &self.health {
            match derive_status(
                self.registry.tenant(entry.key()).state(),
                entry.value().error_rate_percent(),
            ) {
                TenantStatus::Healthy => counts.healthy += 1,
                TenantStatus::Degraded => counts.degraded += 1,
                TenantStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
