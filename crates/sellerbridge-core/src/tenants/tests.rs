use super::*;
use crate::breaker::CircuitState;
use sellerbridge_types::UpstreamError;
use std::sync::atomic::AtomicU32;

fn server_error() -> ResilienceError {
    UpstreamError::ServerError { status: 500, message: "boom".to_string() }.into()
}

fn processor() -> Arc<TenantProcessor> {
    Arc::new(TenantProcessor::new(Arc::new(CircuitBreakerRegistry::new())))
}

struct AlwaysOkProbe;

#[async_trait]
impl TenantProbe for AlwaysOkProbe {
    async fn probe(&self, _tenant_id: &str) -> Result<()> {
        Ok(())
    }
}

struct AlwaysFailProbe;

#[async_trait]
impl TenantProbe for AlwaysFailProbe {
    async fn probe(&self, _tenant_id: &str) -> Result<()> {
        Err(server_error())
    }
}

#[tokio::test]
async fn test_run_for_tenant_tracks_health() {
    let processor = processor();

    let value = processor
        .run_for_tenant("seller-1", || async { Ok(42_u32) }, None)
        .await
        .expect("operation succeeds");

    assert_eq!(value, 42);
    assert_eq!(processor.status_of("seller-1"), TenantStatus::Healthy);
    assert_eq!(processor.all_health().len(), 1);
}

#[tokio::test]
async fn test_failed_tenant_short_circuits_to_fallback() {
    let processor = processor();
    processor.registry.tenant("seller-2").force_state(CircuitState::Open);

    let invoked = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invoked);
    let value = processor
        .run_for_tenant(
            "seller-2",
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1_u32)
            },
            Some(99),
        )
        .await
        .expect("fallback served");

    assert_eq!(value, 99);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    // The breaker was never consulted either: no rejection recorded.
    assert_eq!(processor.registry.tenant("seller-2").stats().rejections, 0);
}

#[tokio::test]
async fn test_failed_tenant_without_fallback_raises_isolation_skip() {
    let processor = processor();
    processor.registry.tenant("seller-3").force_state(CircuitState::Open);

    let err = processor
        .run_for_tenant("seller-3", || async { Ok(()) }, None)
        .await
        .expect_err("isolation skip");

    assert!(matches!(err, ResilienceError::IsolationSkip { .. }));
}

#[tokio::test]
async fn test_batch_isolates_failed_tenant_from_healthy_one() {
    let processor = processor();
    processor.registry.tenant("bad").force_state(CircuitState::Open);

    let tenants = vec!["bad".to_string(), "good".to_string()];
    let outcome = processor
        .run_for_all(&tenants, |_tenant| async { Ok("done") }, BatchOptions::default())
        .await;

    assert_eq!(outcome.skipped, vec!["bad".to_string()]);
    assert_eq!(outcome.succeeded.len(), 1);
    assert_eq!(outcome.succeeded[0].0, "good");
    assert!(outcome.failed.is_empty());

    // The healthy tenant's counters are untouched by the bad one.
    assert_eq!(processor.registry.tenant("good").stats().total_requests, 1);
    assert_eq!(processor.registry.tenant("bad").stats().total_requests, 0);
}

#[tokio::test]
async fn test_batch_collects_failures_without_aborting() {
    let processor = processor();

    let tenants: Vec<String> = (1..=4).map(|i| format!("seller-{i}")).collect();
    let outcome = processor
        .run_for_all(
            &tenants,
            |tenant| async move {
                if tenant == "seller-2" {
                    Err(server_error())
                } else {
                    Ok(tenant)
                }
            },
            BatchOptions::default(),
        )
        .await;

    assert_eq!(outcome.succeeded.len(), 3);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "seller-2");
}

#[tokio::test]
async fn test_batch_abort_stops_admitting_after_first_failure() {
    let processor = processor();

    let tenants: Vec<String> = (1..=3).map(|i| format!("seller-{i}")).collect();
    let outcome = processor
        .run_for_all(
            &tenants,
            |_tenant| async { Err::<(), _>(server_error()) },
            BatchOptions { concurrency_limit: Some(1), continue_on_error: false },
        )
        .await;

    assert!(outcome.succeeded.is_empty());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.skipped.len(), 2);
}

#[tokio::test]
async fn test_batch_emits_summary_event() {
    let processor = processor();
    let mut events = processor.subscribe_batches();

    let tenants = vec!["seller-1".to_string()];
    processor
        .run_for_all(&tenants, |_tenant| async { Ok(()) }, BatchOptions::default())
        .await;

    let summary = events.try_recv().expect("batch summary");
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn test_health_sweep_auto_recovers_failed_tenant() {
    let registry = Arc::new(CircuitBreakerRegistry::new());
    let processor = Arc::new(TenantProcessor::with_config(
        Arc::clone(&registry),
        TenantProcessorConfig {
            health_check_interval: Duration::from_millis(10),
            ..Default::default()
        },
    ));

    // Drive the tenant's breaker open through real failures.
    for _ in 0..5 {
        let _ = processor
            .run_for_tenant("seller-1", || async { Err::<(), _>(server_error()) }, None)
            .await;
    }
    assert_eq!(processor.status_of("seller-1"), TenantStatus::Failed);

    tokio::time::sleep(Duration::from_millis(15)).await;
    processor.run_health_sweep(&AlwaysOkProbe).await;

    assert_eq!(registry.tenant("seller-1").state(), CircuitState::Closed);
    assert_eq!(processor.status_of("seller-1"), TenantStatus::Healthy);
}

#[tokio::test]
async fn test_health_sweep_probe_failures_only_count() {
    let processor = Arc::new(TenantProcessor::with_config(
        Arc::new(CircuitBreakerRegistry::new()),
        TenantProcessorConfig {
            health_check_interval: Duration::from_millis(10),
            ..Default::default()
        },
    ));

    processor
        .run_for_tenant("seller-1", || async { Ok(()) }, None)
        .await
        .expect("seed tenant");
    let before = processor.all_health()[0].consecutive_failures;

    tokio::time::sleep(Duration::from_millis(15)).await;
    processor.run_health_sweep(&AlwaysFailProbe).await;

    let report = &processor.all_health()[0];
    assert_eq!(report.consecutive_failures, before + 1);
    assert_eq!(report.status, TenantStatus::Healthy);
}

#[tokio::test]
async fn test_reset_tenant_drops_state() {
    let processor = processor();
    processor
        .run_for_tenant("seller-1", || async { Ok(()) }, None)
        .await
        .expect("seed tenant");

    processor.reset_tenant("seller-1");
    assert!(processor.all_health().is_empty());
    assert_eq!(processor.counts().total(), 0);
}
