//! Latency-bounded webhook ingestion.
//!
//! The inbound marketplace feed retries on any non-2xx answer, so
//! [`WebhookPipeline::ingest`] always reports success and absorbs every
//! failure internally:
//!
//! 1. content-hash dedup (sub-millisecond, nothing else runs on a hit)
//! 2. budget check - anything already past the emergency threshold is
//!    diverted to the bounded in-memory buffer
//! 3. normal path - owner lookup + durable enqueue under the `webhook`
//!    breaker with the remaining budget as timeout; any failure diverts
//!
//! The buffer is flushed asynchronously in capped batches; the caller is
//! never blocked on a slow or failed downstream dependency.

pub mod buffer;
pub mod dedup;


pub use buffer::{BufferedEvent, EmergencyBuffer, DEFAULT_BUFFER_CAPACITY, FLUSH_BATCH_SIZE};
pub use dedup::{content_hash, DedupCache, DEFAULT_DEDUP_WINDOW};

use parking_lot::Mutex;
use sellerbridge_types::{IngestReceipt, ResilienceError, WebhookCounters};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::breaker::CircuitBreakerRegistry;
use crate::external::{TenantDirectory, WorkQueue};
use crate::telemetry;
use crate::upstream::EndpointClass;

/// EWMA smoothing factor for the ingest response-time average.
const RESPONSE_TIME_ALPHA: f64 = 0.2;

/// Interval of the dedup-cache cleanup sweep.
const DEDUP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Hard acknowledgement budget toward the sender
    pub outer_budget: Duration,
    /// Elapsed time past which processing diverts to the emergency buffer
    pub emergency_threshold: Duration,
    /// Window during which an identical event counts as already handled
    pub dedup_window: Duration,
    /// Emergency buffer capacity (oldest dropped beyond this)
    pub buffer_capacity: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            outer_budget: Duration::from_millis(500),
            emergency_threshold: Duration::from_millis(100),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

#[derive(Debug, Default)]
struct IngestCounters {
    received: AtomicU64,
    duplicates: AtomicU64,
    emergencies: AtomicU64,
    avg_response_time_ms: Mutex<f64>,
}

/// The latency-critical inbound path.
pub struct WebhookPipeline {
    registry: Arc<CircuitBreakerRegistry>,
    directory: Arc<dyn TenantDirectory>,
    queue: Arc<dyn WorkQueue>,
    dedup: DedupCache,
    buffer: Arc<EmergencyBuffer>,
    config: WebhookConfig,
    counters: IngestCounters,
}

impl WebhookPipeline {
    pub fn new(
        registry: Arc<CircuitBreakerRegistry>,
        directory: Arc<dyn TenantDirectory>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self::with_config(registry, directory, queue, WebhookConfig::default())
    }

    pub fn with_config(
        registry: Arc<CircuitBreakerRegistry>,
        directory: Arc<dyn TenantDirectory>,
        queue: Arc<dyn WorkQueue>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            registry,
            directory,
            queue,
            dedup: DedupCache::new(config.dedup_window),
            buffer: Arc::new(EmergencyBuffer::new(config.buffer_capacity)),
            config,
            counters: IngestCounters::default(),
        }
    }

    /// Ingest one webhook payload. Always succeeds toward the sender.
    pub async fn ingest(&self, payload: Value) -> IngestReceipt {
        let started = Instant::now();
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let hash = content_hash(&payload);
        if self.dedup.check_and_insert(&hash) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            let elapsed = started.elapsed();
            self.observe_response_time(elapsed);
            telemetry::record_webhook_ingest("duplicate", elapsed);
            return IngestReceipt::duplicate(elapsed.as_millis() as u64);
        }

        if started.elapsed() >= self.config.emergency_threshold {
            return self.divert(hash, None, payload, started);
        }

        // Normal path: the timeout is the remaining budget, clamped so a
        // slow dependency can never hold the caller past the emergency
        // threshold.
        let elapsed = started.elapsed();
        let remaining = self
            .config
            .outer_budget
            .saturating_sub(elapsed)
            .min(self.config.emergency_threshold.saturating_sub(elapsed));
        let resource = payload
            .get("resource")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let breaker = self.registry.endpoint(EndpointClass::Webhook);
        let outcome = breaker
            .execute_with_timeout(remaining, || async {
                let tenant_id = self.directory.resolve_owner(&resource).await.ok_or_else(|| {
                    ResilienceError::Internal { message: format!("no owner for resource {resource}") }
                })?;
                self.queue.enqueue(&hash, &payload, &tenant_id).await?;
                Ok(tenant_id)
            })
            .await;

        match outcome {
            Ok(tenant_id) => {
                let elapsed = started.elapsed();
                self.observe_response_time(elapsed);
                telemetry::record_webhook_ingest("accepted", elapsed);
                debug!(tenant_id = %tenant_id, elapsed_ms = elapsed.as_millis() as u64, "webhook accepted");
                IngestReceipt::accepted(elapsed.as_millis() as u64)
            }
            Err(err) => {
                debug!(error = %err, "webhook normal path failed, diverting");
                self.divert(hash, None, payload, started)
            }
        }
    }

    /// Divert a payload into the emergency buffer. Never blocks.
    fn divert(
        &self,
        hash: String,
        tenant_id: Option<String>,
        payload: Value,
        started: Instant,
    ) -> IngestReceipt {
        self.counters.emergencies.fetch_add(1, Ordering::Relaxed);
        self.buffer.push(BufferedEvent {
            dedup_key: hash,
            tenant_id,
            payload,
            enqueued_at: Instant::now(),
        });

        let elapsed = started.elapsed();
        self.observe_response_time(elapsed);
        telemetry::record_webhook_ingest("emergency", elapsed);
        IngestReceipt::emergency(elapsed.as_millis() as u64)
    }

    fn observe_response_time(&self, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as f64;
        let mut avg = self.counters.avg_response_time_ms.lock();
        *avg = RESPONSE_TIME_ALPHA * elapsed_ms + (1.0 - RESPONSE_TIME_ALPHA) * *avg;
    }

    /// Throughput/latency counters consumed by the monitor.
    pub fn counters(&self) -> WebhookCounters {
        WebhookCounters {
            received: self.counters.received.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            emergency_diversions: self.counters.emergencies.load(Ordering::Relaxed),
            flushed: self.buffer.flushed_total(),
            dropped: self.buffer.dropped_total(),
            avg_response_time_ms: *self.counters.avg_response_time_ms.lock(),
            buffer_depth: self.buffer.depth(),
        }
    }

    pub fn buffer(&self) -> Arc<EmergencyBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Spawn the emergency-buffer flush loop.
    pub fn start_flush_loop(&self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        self.buffer.start_flush_loop(Arc::clone(&self.queue), shutdown)
    }

    /// Spawn the periodic dedup cleanup sweep.
    pub fn start_dedup_sweep(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(DEDUP_SWEEP_INTERVAL) => {
                        pipeline.dedup.sweep();
                    }
                    _ = shutdown.changed() => {
                        info!("dedup sweep shutting down");
                        break;
                    }
                }
            }
        })
    }
}
