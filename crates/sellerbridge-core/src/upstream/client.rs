//! Breaker-protected client for outbound marketplace calls.

use sellerbridge_types::{ResilienceError, Result, UpstreamError};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::endpoint::{EndpointClass, SlaTracker};
use super::retry::{apply_retry, determine_retry, RetryConfig, RetryDecision};
use crate::breaker::CircuitBreakerRegistry;
use crate::external::{Cache, CredentialStore, TransportRequest, UpstreamTransport};
use crate::telemetry;

/// Default per-call budget when the caller does not supply one.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request knobs for [`ProtectedUpstreamClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: String,
    pub body: Option<Value>,
    /// Overall budget for one attempt, enforced by the breaker
    pub timeout: Duration,
    /// Cache successful bodies under `endpoint:tenant` for this long
    pub cache_ttl: Option<Duration>,
    /// Served when all attempts fail; wins over a stale cached body
    pub fallback: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            body: None,
            timeout: DEFAULT_CALL_TIMEOUT,
            cache_ttl: None,
            fallback: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self { method: "POST".to_string(), body: Some(body), ..Self::default() }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Fresh data from the marketplace
    Live,
    /// Previously cached body served because the live call failed
    Cache,
    /// Caller-supplied fallback served because the live call failed
    Fallback,
}

/// A response from the protected client, marked with its provenance.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub body: Value,
    pub source: ResponseSource,
}

/// Wraps outbound marketplace calls with breaker protection, retry with
/// backoff, response caching and fallback data.
///
/// Call order per attempt: global breaker → endpoint-class breaker →
/// per-call timeout → transport. The global breaker is the outer safety
/// net that caps traffic even when individual endpoint breakers would
/// still admit it.
pub struct ProtectedUpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    credentials: Arc<dyn CredentialStore>,
    cache: Option<Arc<dyn Cache>>,
    registry: Arc<CircuitBreakerRegistry>,
    retry: RetryConfig,
    sla: Arc<SlaTracker>,
}

impl ProtectedUpstreamClient {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        credentials: Arc<dyn CredentialStore>,
        registry: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            transport,
            credentials,
            cache: None,
            registry,
            retry: RetryConfig::default(),
            sla: Arc::new(SlaTracker::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Latency tracker consumed by the resilience monitor.
    pub fn sla(&self) -> Arc<SlaTracker> {
        Arc::clone(&self.sla)
    }

    /// Execute a protected request for one tenant.
    ///
    /// Returns live data, a cached body, or the caller's fallback — in
    /// that order of preference on failure, with fallback always winning
    /// over a stale cache. Typed errors propagate only when no recovery
    /// data exists.
    pub async fn request(
        &self,
        endpoint: &str,
        tenant_id: &str,
        options: RequestOptions,
    ) -> Result<UpstreamResponse> {
        let class = EndpointClass::from_path(endpoint);
        let breaker = self.registry.endpoint(class);
        let global = self.registry.global();

        let Some(token) = self.credentials.active_token(tenant_id).await else {
            return Err(ResilienceError::CredentialMissing { tenant_id: tenant_id.to_string() });
        };

        let request = TransportRequest {
            method: options.method.clone(),
            path: endpoint.to_string(),
            body: options.body.clone(),
        };
        let cache_key = format!("{endpoint}:{tenant_id}");

        let mut attempt: u32 = 0;
        let outcome = loop {
            let started = Instant::now();
            let result = global
                .execute(|| async {
                    breaker
                        .execute_with_timeout(options.timeout, || async {
                            let response = self
                                .transport
                                .call(&request, &token)
                                .await
                                .map_err(ResilienceError::from)?;
                            match UpstreamError::from_status(
                                response.status,
                                body_message(&response.body),
                                response.retry_after_secs,
                            ) {
                                None => Ok(response),
                                Some(e) => Err(e.into()),
                            }
                        })
                        .await
                })
                .await;
            let elapsed = started.elapsed();

            match result {
                Ok(response) => {
                    self.sla.record(class, elapsed, true);
                    telemetry::record_upstream_attempt(class.key(), "success", elapsed);
                    break Ok(response);
                }
                Err(err) => {
                    self.sla.record(class, elapsed, false);
                    telemetry::record_upstream_attempt(class.key(), outcome_label(&err), elapsed);

                    let decision = retry_decision(&self.retry, &err, attempt);
                    if apply_retry(decision, attempt, self.retry.max_attempts, class.key()).await {
                        attempt += 1;
                        continue;
                    }
                    break Err(err);
                }
            }
        };

        match outcome {
            Ok(response) => {
                if let (Some(ttl), Some(cache)) = (options.cache_ttl, &self.cache) {
                    cache.put(&cache_key, response.body.clone(), ttl).await;
                }
                Ok(UpstreamResponse { body: response.body, source: ResponseSource::Live })
            }
            Err(err) => self.recover(&cache_key, options.fallback, err, endpoint).await,
        }
    }

    /// At-most-one recovery path: fallback beats stale cache.
    async fn recover(
        &self,
        cache_key: &str,
        fallback: Option<Value>,
        err: ResilienceError,
        endpoint: &str,
    ) -> Result<UpstreamResponse> {
        if let Some(body) = fallback {
            warn!(endpoint = %endpoint, error = %err, "serving fallback data after upstream failure");
            return Ok(UpstreamResponse { body, source: ResponseSource::Fallback });
        }
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(cache_key).await {
                debug!(endpoint = %endpoint, error = %err, "serving cached data after upstream failure");
                return Ok(UpstreamResponse { body, source: ResponseSource::Cache });
            }
        }
        Err(err)
    }
}

/// Map a failure back to a retry decision.
///
/// Breaker rejections and credential problems never retry: the first is
/// already a fast-fail signal, the second needs the caller to refresh.
fn retry_decision(config: &RetryConfig, err: &ResilienceError, attempt: u32) -> RetryDecision {
    match err {
        ResilienceError::Upstream(upstream) => determine_retry(config, upstream, attempt),
        ResilienceError::OperationTimeout { budget_ms } => {
            determine_retry(config, &UpstreamError::Timeout { budget_ms: *budget_ms }, attempt)
        }
        _ => RetryDecision::NoRetry,
    }
}

fn outcome_label(err: &ResilienceError) -> &'static str {
    match err {
        ResilienceError::CircuitOpen { .. } => "circuit_open",
        ResilienceError::OperationTimeout { .. } => "timeout",
        ResilienceError::Upstream(UpstreamError::RateLimited { .. }) => "rate_limited",
        ResilienceError::Upstream(UpstreamError::ServerError { .. }) => "server_error",
        ResilienceError::Upstream(UpstreamError::AuthRejected { .. }) => "auth_rejected",
        ResilienceError::Upstream(UpstreamError::ClientRejected { .. }) => "client_rejected",
        ResilienceError::Upstream(UpstreamError::Timeout { .. }) => "timeout",
        ResilienceError::Upstream(UpstreamError::Network { .. }) => "network",
        _ => "other",
    }
}

/// Extract a short human-readable message from an upstream error body.
fn body_message(body: &Value) -> String {
    body.get("message")
        .or_else(|| body.get("error").and_then(|e| e.get("message")))
        .and_then(Value::as_str)
        .map_or_else(
            || {
                let raw = body.to_string();
                raw.chars().take(200).collect()
            },
            ToString::to_string,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{InMemoryCache, StaticCredentialStore, TransportResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Transport that replays a scripted sequence of responses.
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<TransportResponse, UpstreamError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(
            script: impl IntoIterator<Item = std::result::Result<TransportResponse, UpstreamError>>,
        ) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(script.into_iter().collect()), calls: AtomicU32::new(0) })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamTransport for ScriptedTransport {
        async fn call(
            &self,
            _request: &TransportRequest,
            _token: &str,
        ) -> std::result::Result<TransportResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| {
                Err(UpstreamError::Network { message: "script exhausted".to_string() })
            })
        }
    }

    fn ok_response(body: Value) -> std::result::Result<TransportResponse, UpstreamError> {
        Ok(TransportResponse { status: 200, body, retry_after_secs: None })
    }

    fn status_response(status: u16) -> std::result::Result<TransportResponse, UpstreamError> {
        Ok(TransportResponse { status, body: serde_json::json!({"message": "err"}), retry_after_secs: None })
    }

    fn client_with(transport: Arc<ScriptedTransport>) -> ProtectedUpstreamClient {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        ProtectedUpstreamClient::new(
            transport,
            Arc::new(StaticCredentialStore::single("seller-1", "tok")),
            registry,
        )
        .with_retry(RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
            jitter: 0.0,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_live_success_and_cache_write() {
        let transport = ScriptedTransport::new([ok_response(serde_json::json!({"id": 7}))]);
        let cache = Arc::new(InMemoryCache::new());
        let client = client_with(Arc::clone(&transport)).with_cache(cache.clone());

        let response = client
            .request(
                "/items/7",
                "seller-1",
                RequestOptions::get().with_cache_ttl(Duration::from_secs(60)),
            )
            .await
            .expect("live data");

        assert_eq!(response.source, ResponseSource::Live);
        assert!(cache.get("/items/7:seller-1").await.is_some());
    }

    #[tokio::test]
    async fn test_server_error_retried_until_success() {
        let transport = ScriptedTransport::new([
            status_response(503),
            ok_response(serde_json::json!({"ok": true})),
        ]);
        let client = client_with(Arc::clone(&transport));

        let response = client
            .request("/orders/1", "seller-1", RequestOptions::get())
            .await
            .expect("second attempt succeeds");

        assert_eq!(response.source, ResponseSource::Live);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_auth_rejection_surfaces_without_retry() {
        let transport = ScriptedTransport::new([status_response(401)]);
        let client = client_with(Arc::clone(&transport));

        let err = client
            .request("/orders/1", "seller-1", RequestOptions::get())
            .await
            .expect_err("auth errors surface");

        assert!(matches!(
            err,
            ResilienceError::Upstream(UpstreamError::AuthRejected { status: 401 })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_wins_over_stale_cache() {
        let transport = ScriptedTransport::new([status_response(404)]);
        let cache = Arc::new(InMemoryCache::new());
        cache.put("/items/9:seller-1", serde_json::json!({"stale": true}), Duration::from_secs(60)).await;
        let client = client_with(Arc::clone(&transport)).with_cache(cache);

        let response = client
            .request(
                "/items/9",
                "seller-1",
                RequestOptions::get().with_fallback(serde_json::json!({"fallback": true})),
            )
            .await
            .expect("fallback served");

        assert_eq!(response.source, ResponseSource::Fallback);
        assert_eq!(response.body, serde_json::json!({"fallback": true}));
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_no_fallback() {
        let transport = ScriptedTransport::new([status_response(500), status_response(500), status_response(500)]);
        let cache = Arc::new(InMemoryCache::new());
        cache.put("/items/3:seller-1", serde_json::json!({"cached": true}), Duration::from_secs(60)).await;
        let client = client_with(Arc::clone(&transport)).with_cache(cache);

        let response = client
            .request("/items/3", "seller-1", RequestOptions::get())
            .await
            .expect("cache served");

        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_missing_credentials_surface_immediately() {
        let transport = ScriptedTransport::new([]);
        let client = client_with(Arc::clone(&transport));

        let err = client
            .request("/items/1", "unknown-seller", RequestOptions::get())
            .await
            .expect_err("no credential");

        assert!(matches!(err, ResilienceError::CredentialMissing { .. }));
        assert_eq!(transport.calls(), 0);
    }
}
