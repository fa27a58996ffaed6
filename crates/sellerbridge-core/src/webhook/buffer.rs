//! Bounded in-memory emergency buffer for diverted webhook events.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::external::WorkQueue;
use crate::telemetry;

/// Default capacity before the oldest events are dropped.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Events handed to the durable queue per flush batch.
pub const FLUSH_BATCH_SIZE: usize = 100;

/// Interval of the background flush loop.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// One diverted event.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub dedup_key: String,
    pub tenant_id: Option<String>,
    pub payload: Value,
    pub enqueued_at: Instant,
}

/// Bounded buffer that never blocks the caller.
///
/// Beyond capacity the oldest event is dropped to protect memory; the
/// sender-facing latency contract outranks at-least-once delivery of the
/// tail.
#[derive(Debug)]
pub struct EmergencyBuffer {
    events: Mutex<VecDeque<BufferedEvent>>,
    capacity: usize,
    flushed_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl EmergencyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            flushed_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Push an event, dropping the oldest one at capacity.
    pub fn push(&self, event: BufferedEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            telemetry::record_buffer_dropped(1);
            warn!(capacity = self.capacity, "emergency buffer full, dropped oldest event");
        }
        events.push_back(event);
        telemetry::record_buffer_depth(events.len());
    }

    /// Take up to `limit` events from the front.
    fn drain_batch(&self, limit: usize) -> Vec<BufferedEvent> {
        let mut events = self.events.lock();
        let take = limit.min(events.len());
        let batch: Vec<_> = events.drain(..take).collect();
        telemetry::record_buffer_depth(events.len());
        batch
    }

    pub fn depth(&self) -> usize {
        self.events.lock().len()
    }

    pub fn flushed_total(&self) -> u64 {
        self.flushed_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Flush one batch to the durable queue.
    ///
    /// Per-item errors are swallowed: one poison event must not stall the
    /// batch. Failed items are logged and dropped — the marketplace will
    /// redeliver anything that matters.
    pub async fn flush_batch(&self, queue: &dyn WorkQueue) -> usize {
        let batch = self.drain_batch(FLUSH_BATCH_SIZE);
        if batch.is_empty() {
            return 0;
        }

        let mut flushed = 0_usize;
        for event in batch {
            let tenant_id = event.tenant_id.as_deref().unwrap_or("");
            match queue.enqueue(&event.dedup_key, &event.payload, tenant_id).await {
                Ok(()) => flushed += 1,
                Err(err) => {
                    warn!(
                        dedup_key = %event.dedup_key,
                        error = %err,
                        "failed to flush buffered event, dropping"
                    );
                }
            }
        }

        self.flushed_total.fetch_add(flushed as u64, Ordering::Relaxed);
        telemetry::record_buffer_flushed(flushed as u64);
        debug!(flushed, remaining = self.depth(), "emergency buffer batch flushed");
        flushed
    }

    /// Spawn the background flush loop.
    pub fn start_flush_loop(
        self: &Arc<Self>,
        queue: Arc<dyn WorkQueue>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(FLUSH_INTERVAL) => {
                        buffer.flush_batch(queue.as_ref()).await;
                    }
                    _ = shutdown.changed() => {
                        info!(depth = buffer.depth(), "flush loop draining before shutdown");
                        while buffer.flush_batch(queue.as_ref()).await > 0 {}
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::InMemoryQueue;
    use async_trait::async_trait;
    use sellerbridge_types::ResilienceError;

    fn event(key: &str) -> BufferedEvent {
        BufferedEvent {
            dedup_key: key.to_string(),
            tenant_id: Some("t1".to_string()),
            payload: serde_json::json!({"k": key}),
            enqueued_at: Instant::now(),
        }
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let buffer = EmergencyBuffer::new(3);
        for i in 0..5 {
            buffer.push(event(&format!("e{i}")));
        }

        assert_eq!(buffer.depth(), 3);
        assert_eq!(buffer.dropped_total(), 2);
        let kept = buffer.drain_batch(10);
        assert_eq!(kept[0].dedup_key, "e2");
        assert_eq!(kept[2].dedup_key, "e4");
    }

    #[tokio::test]
    async fn test_flush_hands_events_to_queue() {
        let buffer = EmergencyBuffer::new(100);
        let queue = InMemoryQueue::new();
        buffer.push(event("a"));
        buffer.push(event("b"));

        let flushed = buffer.flush_batch(&queue).await;

        assert_eq!(flushed, 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(buffer.depth(), 0);
        assert_eq!(buffer.flushed_total(), 2);
    }

    /// Queue that rejects a specific dedup key.
    struct PoisonQueue {
        inner: InMemoryQueue,
        poison: String,
    }

    #[async_trait]
    impl crate::external::WorkQueue for PoisonQueue {
        async fn enqueue(
            &self,
            dedup_key: &str,
            payload: &Value,
            tenant_id: &str,
        ) -> std::result::Result<(), ResilienceError> {
            if dedup_key == self.poison {
                return Err(ResilienceError::QueueUnavailable { message: "poison".to_string() });
            }
            self.inner.enqueue(dedup_key, payload, tenant_id).await
        }
    }

    #[tokio::test]
    async fn test_poison_item_does_not_stall_batch() {
        let buffer = EmergencyBuffer::new(100);
        let queue = PoisonQueue { inner: InMemoryQueue::new(), poison: "bad".to_string() };
        buffer.push(event("a"));
        buffer.push(event("bad"));
        buffer.push(event("c"));

        let flushed = buffer.flush_batch(&queue).await;

        assert_eq!(flushed, 2);
        assert_eq!(queue.inner.len(), 2);
        assert_eq!(buffer.depth(), 0);
    }
}
