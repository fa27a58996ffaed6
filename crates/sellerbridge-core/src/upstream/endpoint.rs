//! Endpoint class normalization, breaker presets and SLA tracking.

use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::breaker::CircuitConfig;

/// EWMA smoothing factor for per-class latency.
const LATENCY_ALPHA: f64 = 0.2;

/// Normalized class of a marketplace endpoint.
///
/// Classes carry distinct breaker presets reflecting criticality: auth
/// endpoints tolerate more failures before opening than the near-real-time
/// question endpoints, where a stuck upstream is immediately visible to
/// buyers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Oauth,
    Items,
    Orders,
    Questions,
    Webhook,
    Default,
}

impl EndpointClass {
    /// Map an arbitrary endpoint path to its class.
    pub fn from_path(path: &str) -> Self {
        let normalized = path.trim_start_matches('/');
        let head = normalized.split(['/', '?']).next().unwrap_or_default();
        match head {
            "oauth" | "token" => Self::Oauth,
            "items" | "listings" => Self::Items,
            "orders" | "shipments" => Self::Orders,
            "questions" | "answers" => Self::Questions,
            "webhook" | "notifications" => Self::Webhook,
            _ => Self::Default,
        }
    }

    /// Stable key for registries, logs and metric labels.
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Oauth => "oauth",
            Self::Items => "items",
            Self::Orders => "orders",
            Self::Questions => "questions",
            Self::Webhook => "webhook",
            Self::Default => "default",
        }
    }

    /// Breaker preset for this class.
    pub fn breaker_config(&self) -> CircuitConfig {
        let base = CircuitConfig::named(self.key());
        match self {
            // Token refresh hiccups are common and self-heal; opening the
            // auth circuit blocks every tenant at once, so be tolerant.
            Self::Oauth => CircuitConfig {
                failure_threshold: 10,
                open_timeout: Duration::from_secs(60),
                volume_threshold: 5,
                error_threshold_percentage: 70.0,
                ..base
            },
            Self::Items | Self::Orders => CircuitConfig {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(30),
                ..base
            },
            // Buyer-visible, near-real-time: cut off fast and re-probe fast.
            Self::Questions => CircuitConfig {
                failure_threshold: 3,
                open_timeout: Duration::from_secs(15),
                volume_threshold: 5,
                error_threshold_percentage: 40.0,
                ..base
            },
            Self::Webhook => CircuitConfig {
                failure_threshold: 5,
                open_timeout: Duration::from_secs(10),
                ..base
            },
            Self::Default => base,
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Rolling latency/error view for one endpoint class.
#[derive(Debug, Clone, Serialize)]
pub struct SlaStats {
    pub endpoint: String,
    pub attempts: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug)]
struct SlaEntry {
    attempts: u64,
    failures: u64,
    avg_latency_ms: f64,
    max_latency_ms: u64,
    last_attempt_at: Instant,
}

/// Per-endpoint-class SLA tracker, consumed by the monitor.
#[derive(Debug, Default)]
pub struct SlaTracker {
    entries: DashMap<&'static str, SlaEntry>,
}

impl SlaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, class: EndpointClass, elapsed: Duration, ok: bool) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let mut entry = self.entries.entry(class.key()).or_insert_with(|| SlaEntry {
            attempts: 0,
            failures: 0,
            avg_latency_ms: elapsed_ms as f64,
            max_latency_ms: 0,
            last_attempt_at: Instant::now(),
        });
        entry.attempts += 1;
        if !ok {
            entry.failures += 1;
        }
        entry.avg_latency_ms =
            LATENCY_ALPHA * elapsed_ms as f64 + (1.0 - LATENCY_ALPHA) * entry.avg_latency_ms;
        entry.max_latency_ms = entry.max_latency_ms.max(elapsed_ms);
        entry.last_attempt_at = Instant::now();
    }

    pub fn snapshot(&self) -> Vec<SlaStats> {
        let mut stats: Vec<_> = self
            .entries
            .iter()
            .map(|e| SlaStats {
                endpoint: (*e.key()).to_string(),
                attempts: e.attempts,
                failures: e.failures,
                avg_latency_ms: e.avg_latency_ms,
                max_latency_ms: e.max_latency_ms,
            })
            .collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_normalization() {
        assert_eq!(EndpointClass::from_path("/oauth/token"), EndpointClass::Oauth);
        assert_eq!(EndpointClass::from_path("items/MLA123"), EndpointClass::Items);
        assert_eq!(EndpointClass::from_path("/questions?seller=1"), EndpointClass::Questions);
        assert_eq!(EndpointClass::from_path("/users/me"), EndpointClass::Default);
    }

    #[test]
    fn test_presets_reflect_criticality() {
        let oauth = EndpointClass::Oauth.breaker_config();
        let questions = EndpointClass::Questions.breaker_config();
        assert!(oauth.failure_threshold > questions.failure_threshold);
        assert!(oauth.open_timeout > questions.open_timeout);
    }

    #[test]
    fn test_sla_tracker_ewma_and_max() {
        let tracker = SlaTracker::new();
        tracker.record(EndpointClass::Items, Duration::from_millis(100), true);
        tracker.record(EndpointClass::Items, Duration::from_millis(200), false);

        let stats = tracker.snapshot();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].attempts, 2);
        assert_eq!(stats[0].failures, 1);
        assert_eq!(stats[0].max_latency_ms, 200);
        // EWMA: 0.2 * 200 + 0.8 * 100 = 120
        assert!((stats[0].avg_latency_ms - 120.0).abs() < 1e-9);
    }
}
