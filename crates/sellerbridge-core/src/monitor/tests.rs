use super::*;
use crate::breaker::CircuitState;
use crate::external::{InMemoryQueue, StaticTenantDirectory};
use sellerbridge_types::{OverallStatus, ResilienceError, UpstreamError};

fn harness() -> (Arc<CircuitBreakerRegistry>, Arc<TenantProcessor>, Arc<WebhookPipeline>, ResilienceMonitor)
{
    let registry = Arc::new(CircuitBreakerRegistry::new());
    let processor = Arc::new(TenantProcessor::new(Arc::clone(&registry)));
    let pipeline = Arc::new(WebhookPipeline::new(
        Arc::clone(&registry),
        Arc::new(StaticTenantDirectory::default()),
        Arc::new(InMemoryQueue::new()),
    ));
    let monitor =
        ResilienceMonitor::new(Arc::clone(&registry), Arc::clone(&processor), Arc::clone(&pipeline));
    (registry, processor, pipeline, monitor)
}

#[tokio::test]
async fn test_collect_reflects_breaker_states() {
    let (registry, _, _, monitor) = harness();
    registry.tenant("a").force_state(CircuitState::Open);
    registry.tenant("b");

    let snapshot = monitor.collect();

    assert_eq!(snapshot.breakers.open, 1);
    // tenant "b" plus the global breaker
    assert_eq!(snapshot.breakers.closed, 2);
    assert_eq!(monitor.history(10).len(), 1);
}

#[tokio::test]
async fn test_two_open_breakers_raise_critical_once() {
    let (registry, _, _, monitor) = harness();
    registry.tenant("a").force_state(CircuitState::Open);
    registry.tenant("b").force_state(CircuitState::Open);

    monitor.collect();
    monitor.evaluate_alerts();
    monitor.collect();
    monitor.evaluate_alerts();

    let active = monitor.active_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, sellerbridge_types::AlertSeverity::Critical);
    assert_eq!(active[0].component, "breakers");
}

#[tokio::test]
async fn test_tenant_failure_rate_raises_warning() {
    let (_, processor, _, monitor) = harness();

    // 1 of 2 tenants failed: 50% > 30%
    for _ in 0..5 {
        let _ = processor
            .run_for_tenant(
                "bad",
                || async {
                    Err::<(), _>(
                        UpstreamError::ServerError { status: 500, message: "x".to_string() }.into(),
                    )
                },
                None,
            )
            .await;
    }
    processor.run_for_tenant("good", || async { Ok(()) }, None).await.expect("healthy tenant");

    monitor.collect();
    monitor.evaluate_alerts();

    assert!(monitor
        .active_alerts()
        .iter()
        .any(|a| a.component == "tenants" && a.severity == sellerbridge_types::AlertSeverity::Warning));
}

#[tokio::test]
async fn test_emergency_diversion_rate_raises_critical() {
    let (_, _, pipeline, monitor) = harness();

    // Unknown owners: every ingest diverts to the buffer.
    for i in 0..5 {
        let receipt = pipeline
            .ingest(serde_json::json!({
                "topic": "orders",
                "resource": format!("/orders/{i}"),
            }))
            .await;
        assert!(receipt.emergency);
    }

    monitor.collect();
    monitor.evaluate_alerts();

    assert!(monitor
        .active_alerts()
        .iter()
        .any(|a| a.component == "webhook" && a.severity == sellerbridge_types::AlertSeverity::Critical));
}

#[tokio::test]
async fn test_health_report_tracks_acknowledgement() {
    let (registry, _, _, monitor) = harness();
    registry.tenant("a").force_state(CircuitState::Open);
    registry.tenant("b").force_state(CircuitState::Open);

    monitor.collect();
    monitor.evaluate_alerts();
    assert_eq!(monitor.health_report().status, OverallStatus::Critical);

    let id = monitor.active_alerts()[0].id;
    assert!(monitor.acknowledge_alert(id));
    assert_eq!(monitor.health_report().status, OverallStatus::Healthy);
}

#[tokio::test]
async fn test_current_metrics_collects_on_demand() {
    let (_, _, _, monitor) = harness();
    assert!(monitor.history(10).is_empty());

    let snapshot = monitor.current_metrics();
    assert_eq!(snapshot.tenants.total(), 0);
    assert_eq!(monitor.history(10).len(), 1);
}

#[tokio::test]
async fn test_isolation_skip_is_not_a_circuit_charge() {
    // Regression guard: IsolationSkip propagating through a batch must
    // not show up as breaker failures in the snapshot.
    let (registry, processor, _, monitor) = harness();
    registry.tenant("skipped").force_state(CircuitState::Open);

    let err = processor
        .run_for_tenant("skipped", || async { Ok(()) }, None)
        .await
        .expect_err("isolated");
    assert!(matches!(err, ResilienceError::IsolationSkip { .. }));

    let snapshot = monitor.collect();
    assert_eq!(snapshot.breakers.error_rate_percent, 0.0);
}
