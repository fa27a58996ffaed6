//! Content-hash deduplication of inbound webhook events.

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default window during which a repeated identical event counts as
/// already handled.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(300);

/// Deterministic content hash over the stable fields of a webhook payload.
///
/// Marketplace redeliveries carry fresh delivery ids and timestamps, so
/// hashing the raw body would defeat deduplication; only topic, resource,
/// owning user and the nested payload body participate.
pub fn content_hash(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    for field in ["topic", "resource", "user_id", "tenant_id"] {
        if let Some(value) = payload.get(field) {
            hasher.update(field.as_bytes());
            hasher.update(value.to_string().as_bytes());
        }
    }
    if let Some(body) = payload.get("payload").or_else(|| payload.get("body")) {
        hasher.update(body.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Fixed-window dedup set keyed by content hash.
///
/// Entries are purged by the periodic sweep, not per request; presence of
/// a live entry means "already accepted".
#[derive(Debug)]
pub struct DedupCache {
    entries: DashMap<String, Instant>,
    window: Duration,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self { entries: DashMap::new(), window }
    }

    /// Record a hash; returns true if it was already live in the window.
    pub fn check_and_insert(&self, hash: &str) -> bool {
        let now = Instant::now();
        match self.entries.get(hash) {
            Some(seen) if now.duration_since(*seen) < self.window => true,
            _ => {
                self.entries.insert(hash.to_string(), now);
                false
            }
        }
    }

    /// Purge expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.window;
        let before = self.entries.len();
        self.entries.retain(|_, seen| now.duration_since(*seen) < window);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "dedup sweep purged expired entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_delivery_noise() {
        let first = json!({
            "topic": "orders",
            "resource": "/orders/123",
            "user_id": 42,
            "delivery_id": "a-1",
            "sent": "2024-01-01T00:00:00Z"
        });
        let redelivery = json!({
            "topic": "orders",
            "resource": "/orders/123",
            "user_id": 42,
            "delivery_id": "a-2",
            "sent": "2024-01-01T00:00:05Z"
        });
        assert_eq!(content_hash(&first), content_hash(&redelivery));
    }

    #[test]
    fn test_hash_differs_by_resource() {
        let a = json!({"topic": "orders", "resource": "/orders/1"});
        let b = json!({"topic": "orders", "resource": "/orders/2"});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let cache = DedupCache::new(Duration::from_millis(20));
        assert!(!cache.check_and_insert("h1"));
        assert!(cache.check_and_insert("h1"));

        std::thread::sleep(Duration::from_millis(25));
        assert!(!cache.check_and_insert("h1"));
    }

    #[test]
    fn test_sweep_purges_only_expired() {
        let cache = DedupCache::new(Duration::from_millis(20));
        cache.check_and_insert("old");
        std::thread::sleep(Duration::from_millis(25));
        cache.check_and_insert("fresh");

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }
}
