//! Narrow interfaces to external collaborators.
//!
//! The resilience layer never assumes transactional semantics from any of
//! these: the durable queue, the credential store and the cache may all be
//! unavailable, and every caller must tolerate that by degrading to
//! cached/fallback data or emergency buffering.

use async_trait::async_trait;
use sellerbridge_types::{ResilienceError, UpstreamError};
use serde_json::Value;
use std::time::{Duration, Instant};

/// One request to the marketplace API.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: "GET".to_string(), path: path.into(), body: None }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { method: "POST".to_string(), path: path.into(), body: Some(body) }
    }
}

/// A raw HTTP response from the marketplace.
///
/// Transports hand back every HTTP status as `Ok`; only transport-level
/// failures (connect, TLS, deadline) become errors. Classification of
/// status codes is the protected client's job.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
    /// Parsed `retry-after` hint in seconds, when the server sent one
    pub retry_after_secs: Option<u64>,
}

/// Outbound call to the external marketplace API.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn call(
        &self,
        request: &TransportRequest,
        token: &str,
    ) -> std::result::Result<TransportResponse, UpstreamError>;
}

/// Tenant secrets, already decrypted by the excluded auth layer.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn active_token(&self, tenant_id: &str) -> Option<String>;
}

/// Durable queue for deferred webhook processing.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(
        &self,
        dedup_key: &str,
        payload: &Value,
        tenant_id: &str,
    ) -> std::result::Result<(), ResilienceError>;
}

/// Maps a webhook resource to the tenant that owns it.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve_owner(&self, resource: &str) -> Option<String>;
}

/// Optional response cache. Absence degrades silently to "no cache".
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn put(&self, key: &str, value: Value, ttl: Duration);
}

// ---------------------------------------------------------------------------
// In-memory implementations for tests and local development
// ---------------------------------------------------------------------------

/// In-memory work queue collecting enqueued items.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    items: parking_lot::Mutex<Vec<(String, Value, String)>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<(String, Value, String)> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn enqueue(
        &self,
        dedup_key: &str,
        payload: &Value,
        tenant_id: &str,
    ) -> std::result::Result<(), ResilienceError> {
        self.items.lock().push((dedup_key.to_string(), payload.clone(), tenant_id.to_string()));
        Ok(())
    }
}

/// In-memory TTL cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: dashmap::DashMap<String, (Value, Instant)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        let (value, expires_at) = entry.value();
        if Instant::now() < *expires_at {
            Some(value.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }
}

/// Fixed tenant→token mapping.
#[derive(Debug, Default)]
pub struct StaticCredentialStore {
    tokens: std::collections::HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { tokens: tokens.into_iter().collect() }
    }

    pub fn single(tenant_id: &str, token: &str) -> Self {
        Self::new([(tenant_id.to_string(), token.to_string())])
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn active_token(&self, tenant_id: &str) -> Option<String> {
        self.tokens.get(tenant_id).cloned()
    }
}

/// Fixed resource→tenant mapping.
#[derive(Debug, Default)]
pub struct StaticTenantDirectory {
    owners: std::collections::HashMap<String, String>,
}

impl StaticTenantDirectory {
    pub fn new(owners: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { owners: owners.into_iter().collect() }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn resolve_owner(&self, resource: &str) -> Option<String> {
        self.owners.get(resource).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_expires() {
        let cache = InMemoryCache::new();
        cache.put("k", serde_json::json!(1), Duration::from_millis(10)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_queue_collects() {
        let queue = InMemoryQueue::new();
        queue.enqueue("h1", &serde_json::json!({"id": 1}), "t1").await.expect("enqueue");
        assert_eq!(queue.len(), 1);
    }
}
