//! Explicit resilience context with a controlled lifecycle.
//!
//! Replaces ambient module-level singletons: callers construct one
//! context, `start()` its background tasks, pass it by reference to
//! whatever needs it, and `shutdown()` it on exit. Shutdown drains the
//! emergency buffer best-effort under a deadline and never blocks exit
//! indefinitely.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::breaker::CircuitBreakerRegistry;
use crate::external::{Cache, CredentialStore, TenantDirectory, UpstreamTransport, WorkQueue};
use crate::monitor::{MonitorConfig, ResilienceMonitor};
use crate::tenants::{TenantProbe, TenantProcessor, TenantProcessorConfig};
use crate::upstream::{ProtectedUpstreamClient, RetryConfig};
use crate::webhook::{WebhookConfig, WebhookPipeline};

/// External collaborators the context wires together.
pub struct Collaborators {
    pub transport: Arc<dyn UpstreamTransport>,
    pub credentials: Arc<dyn CredentialStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub directory: Arc<dyn TenantDirectory>,
    /// Optional; absence degrades silently to "no cache"
    pub cache: Option<Arc<dyn Cache>>,
}

/// Aggregate configuration for the whole layer.
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub tenants: TenantProcessorConfig,
    pub webhook: WebhookConfig,
    pub monitor: MonitorConfig,
    pub retry: RetryConfig,
    /// Budget for draining background tasks on shutdown
    pub shutdown_drain_deadline: Duration,
}

impl ContextConfig {
    fn drain_deadline(&self) -> Duration {
        if self.shutdown_drain_deadline.is_zero() {
            Duration::from_secs(5)
        } else {
            self.shutdown_drain_deadline
        }
    }
}

/// Owns every resilience component and its background tasks.
pub struct ResilienceContext {
    registry: Arc<CircuitBreakerRegistry>,
    client: Arc<ProtectedUpstreamClient>,
    processor: Arc<TenantProcessor>,
    pipeline: Arc<WebhookPipeline>,
    monitor: Arc<ResilienceMonitor>,
    config: ContextConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ResilienceContext {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_config(collaborators, ContextConfig::default())
    }

    pub fn with_config(collaborators: Collaborators, config: ContextConfig) -> Self {
        let registry = Arc::new(CircuitBreakerRegistry::new());

        let mut client = ProtectedUpstreamClient::new(
            Arc::clone(&collaborators.transport),
            Arc::clone(&collaborators.credentials),
            Arc::clone(&registry),
        )
        .with_retry(config.retry.clone());
        if let Some(cache) = &collaborators.cache {
            client = client.with_cache(Arc::clone(cache));
        }

        let processor =
            Arc::new(TenantProcessor::with_config(Arc::clone(&registry), config.tenants.clone()));
        let pipeline = Arc::new(WebhookPipeline::with_config(
            Arc::clone(&registry),
            Arc::clone(&collaborators.directory),
            Arc::clone(&collaborators.queue),
            config.webhook.clone(),
        ));
        let monitor = Arc::new(ResilienceMonitor::with_config(
            Arc::clone(&registry),
            Arc::clone(&processor),
            Arc::clone(&pipeline),
            config.monitor.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            registry,
            client: Arc::new(client),
            processor,
            pipeline,
            monitor,
            config,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn every background task: breaker stats sweep, tenant health
    /// sweep, emergency-buffer flush, dedup cleanup and the two monitor
    /// loops.
    pub fn start(&self, probe: Arc<dyn TenantProbe>) {
        let shutdown = self.shutdown_tx.subscribe();
        let mut tasks = self.tasks.lock();

        tasks.push(self.registry.start_stats_sweep(shutdown.clone()));
        tasks.push(self.processor.start_health_sweep(probe, shutdown.clone()));
        tasks.push(self.pipeline.start_flush_loop(shutdown.clone()));
        tasks.push(self.pipeline.start_dedup_sweep(shutdown.clone()));
        let (collector, evaluator) = self.monitor.start(shutdown);
        tasks.push(collector);
        tasks.push(evaluator);

        info!(tasks = tasks.len(), "resilience context started");
    }

    /// Signal shutdown, drain best-effort, abort anything still running
    /// past the deadline.
    pub async fn shutdown(&self) {
        info!("resilience context shutting down");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        let aborts: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();

        let drain = async move {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.config.drain_deadline(), drain).await.is_err() {
            warn!("shutdown drain deadline exceeded, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
    }

    /// Manual operator override.
    ///
    /// `None` resets every breaker; `tenant:{id}` resets one tenant's
    /// breaker and health record; any other key resets that breaker.
    pub fn reset(&self, target: Option<&str>) {
        match target {
            None => self.registry.reset_all(),
            Some(key) => {
                if let Some(tenant_id) = key.strip_prefix("tenant:") {
                    self.processor.reset_tenant(tenant_id);
                } else {
                    self.registry.reset(key);
                }
            }
        }
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &Arc<ProtectedUpstreamClient> {
        &self.client
    }

    pub fn processor(&self) -> &Arc<TenantProcessor> {
        &self.processor
    }

    pub fn pipeline(&self) -> &Arc<WebhookPipeline> {
        &self.pipeline
    }

    pub fn monitor(&self) -> &Arc<ResilienceMonitor> {
        &self.monitor
    }
}
