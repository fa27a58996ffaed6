//! Tracing and Prometheus metrics initialization.
//!
//! Exposes metrics compatible with Prometheus/OpenMetrics format:
//! - `sellerbridge_upstream_requests_total{endpoint,outcome}` - Counter of upstream attempts
//! - `sellerbridge_upstream_duration_seconds{endpoint}` - Histogram of attempt durations
//! - `sellerbridge_breaker_transitions_total{circuit,state}` - Counter of state changes
//! - `sellerbridge_webhook_ingest_total{outcome}` - Counter of ingestions by outcome
//! - `sellerbridge_webhook_duration_seconds` - Histogram of ingest latency
//! - `sellerbridge_emergency_buffer_depth` - Gauge of buffered events
//! - `sellerbridge_emergency_flushed_total` - Counter of events flushed to the queue
//! - `sellerbridge_emergency_dropped_total` - Counter of events dropped at capacity
//! - `sellerbridge_tenant_batch_total{result}` - Counter of per-tenant batch outcomes
//!
//! All recording helpers go through the `metrics` facade: with no recorder
//! installed they are no-ops, so library users who skip `init_metrics()`
//! pay nothing.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Global Prometheus handle for rendering metrics
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Histogram buckets tuned for the webhook ingestion path.
///
/// The pipeline's budget is sub-second by contract: the emergency
/// threshold sits at 100ms and the outer acknowledgement budget at 500ms,
/// so bucket resolution concentrates there.
const INGEST_LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms - dedup hit
    0.005, // 5ms - fast normal path
    0.025, // 25ms - normal path with queue write
    0.05,  // 50ms
    0.1,   // 100ms - emergency threshold
    0.25,  // 250ms
    0.5,   // 500ms - outer acknowledgement budget
    1.0,   // 1s - should never happen
];

/// Install a global `FmtSubscriber` for binaries and test harnesses.
///
/// Returns quietly if a subscriber is already set (repeated test setup).
pub fn init_tracing(max_level: Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(max_level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at application startup before any metrics are
/// recorded. Returns the handle used to render metrics as text.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new()
                .set_buckets(INGEST_LATENCY_BUCKETS)
                .expect("Failed to set histogram buckets");
            let handle = builder
                .install_recorder()
                .expect("Failed to install Prometheus metrics recorder");

            describe_counter!(
                "sellerbridge_upstream_requests_total",
                "Total upstream marketplace call attempts"
            );
            describe_histogram!(
                "sellerbridge_upstream_duration_seconds",
                "Upstream call attempt duration in seconds"
            );
            describe_counter!(
                "sellerbridge_breaker_transitions_total",
                "Circuit breaker state transitions"
            );
            describe_counter!(
                "sellerbridge_webhook_ingest_total",
                "Webhook ingestions by outcome"
            );
            describe_histogram!(
                "sellerbridge_webhook_duration_seconds",
                "Webhook ingest latency in seconds"
            );
            describe_gauge!(
                "sellerbridge_emergency_buffer_depth",
                "Events currently held in the emergency buffer"
            );
            describe_counter!(
                "sellerbridge_emergency_flushed_total",
                "Events flushed from the emergency buffer to the durable queue"
            );
            describe_counter!(
                "sellerbridge_emergency_dropped_total",
                "Events dropped because the emergency buffer was at capacity"
            );
            describe_counter!(
                "sellerbridge_tenant_batch_total",
                "Per-tenant outcomes of batch processing"
            );

            handle
        })
        .clone()
}

/// Record one upstream call attempt.
pub(crate) fn record_upstream_attempt(endpoint: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "sellerbridge_upstream_requests_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "sellerbridge_upstream_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Record a breaker state transition.
pub(crate) fn record_breaker_transition(circuit: &str, to: crate::breaker::CircuitState) {
    counter!(
        "sellerbridge_breaker_transitions_total",
        "circuit" => circuit.to_string(),
        "state" => to.to_string()
    )
    .increment(1);
}

/// Record one webhook ingestion outcome.
pub(crate) fn record_webhook_ingest(outcome: &'static str, elapsed: Duration) {
    counter!("sellerbridge_webhook_ingest_total", "outcome" => outcome).increment(1);
    histogram!("sellerbridge_webhook_duration_seconds").record(elapsed.as_secs_f64());
}

pub(crate) fn record_buffer_depth(depth: usize) {
    gauge!("sellerbridge_emergency_buffer_depth").set(depth as f64);
}

pub(crate) fn record_buffer_flushed(count: u64) {
    counter!("sellerbridge_emergency_flushed_total").increment(count);
}

pub(crate) fn record_buffer_dropped(count: u64) {
    counter!("sellerbridge_emergency_dropped_total").increment(count);
}

/// Record per-tenant batch outcomes.
pub(crate) fn record_tenant_batch(result: &'static str, count: u64) {
    counter!("sellerbridge_tenant_batch_total", "result" => result).increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        // The metrics facade drops records when no recorder is installed;
        // this must not panic.
        record_upstream_attempt("items", "success", Duration::from_millis(12));
        record_webhook_ingest("accepted", Duration::from_millis(3));
        record_buffer_depth(0);
        record_tenant_batch("success", 4);
    }
}
