//! Keyed collection of circuit breakers.
//!
//! One breaker per upstream endpoint class, one per tenant, plus a single
//! global breaker as an outer safety net. Breakers are created lazily with
//! per-class presets and share one bounded state-change event bus and one
//! periodic stats-reset sweep.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use super::state::BreakerEvent;
use super::{CircuitBreaker, CircuitConfig, CircuitState};
use crate::upstream::EndpointClass;

/// Bounded capacity of the state-change event bus.
const EVENT_BUS_CAPACITY: usize = 64;

/// Interval of the shared rolling-counter sweep.
const STATS_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

const TENANT_PREFIX: &str = "tenant:";

/// Aggregate view of all registered breakers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrySummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_trips: u64,
    /// Failures over requests across every breaker's current window
    pub error_rate_percent: f64,
}

/// Registry of breakers for endpoint classes, tenants, and the global net.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    global: Arc<CircuitBreaker>,
    tenant_template: CircuitConfig,
    events: broadcast::Sender<BreakerEvent>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::with_tenant_template(CircuitConfig {
            name: String::new(),
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            volume_threshold: 5,
            error_threshold_percentage: 50.0,
            stats_reset_interval: Duration::from_secs(60),
        })
    }

    /// Create a registry whose tenant breakers use the given template.
    pub fn with_tenant_template(tenant_template: CircuitConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let global = Arc::new(CircuitBreaker::with_events(
            CircuitConfig {
                name: "global".to_string(),
                failure_threshold: 20,
                success_threshold: 3,
                open_timeout: Duration::from_secs(30),
                volume_threshold: 50,
                error_threshold_percentage: 60.0,
                stats_reset_interval: Duration::from_secs(60),
            },
            Some(events.clone()),
        ));
        Self { breakers: DashMap::new(), global, tenant_template, events }
    }

    /// Breaker for an endpoint class, lazily created with its preset.
    pub fn endpoint(&self, class: EndpointClass) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(class.key().to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_events(class.breaker_config(), Some(self.events.clone())))
            })
            .clone()
    }

    /// Breaker for a tenant, lazily created from the tenant template.
    pub fn tenant(&self, tenant_id: &str) -> Arc<CircuitBreaker> {
        let key = format!("{TENANT_PREFIX}{tenant_id}");
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                let config = CircuitConfig { name: key, ..self.tenant_template.clone() };
                Arc::new(CircuitBreaker::with_events(config, Some(self.events.clone())))
            })
            .clone()
    }

    /// The outer safety-net breaker, consulted on every protected call.
    pub fn global(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.global)
    }

    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        if key == "global" {
            return Some(self.global());
        }
        self.breakers.get(key).map(|b| Arc::clone(b.value()))
    }

    /// Subscribe to state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Manual operator reset of one breaker. Returns false for unknown keys.
    pub fn reset(&self, key: &str) -> bool {
        match self.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        info!("resetting all circuit breakers");
        self.global.reset();
        for entry in &self.breakers {
            entry.value().reset();
        }
    }

    /// Drop a tenant's breaker entirely (explicit tenant removal).
    pub fn remove_tenant(&self, tenant_id: &str) {
        self.breakers.remove(&format!("{TENANT_PREFIX}{tenant_id}"));
    }

    /// Count breakers by state and aggregate the window error rate.
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary::default();
        let mut failures: u64 = 0;
        let mut requests: u64 = 0;

        let mut tally = |breaker: &CircuitBreaker| {
            match breaker.state() {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
            let stats = breaker.stats();
            summary.total_trips += stats.total_trips;
            failures += stats.failures;
            requests += stats.total_requests;
        };

        tally(&self.global);
        for entry in &self.breakers {
            tally(entry.value());
        }

        if requests > 0 {
            summary.error_rate_percent = failures as f64 / requests as f64 * 100.0;
        }
        summary
    }

    /// Per-breaker stat views for the dashboard.
    pub fn all_stats(&self) -> Vec<super::CircuitStatsView> {
        let mut stats: Vec<_> = self.breakers.iter().map(|e| e.value().stats()).collect();
        stats.push(self.global.stats());
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Spawn the shared rolling-counter sweep.
    ///
    /// One task serves every breaker: per-instance timers do not scale to
    /// large tenant counts.
    pub fn start_stats_sweep(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(STATS_SWEEP_INTERVAL) => {
                        let now = Instant::now();
                        registry.global.maybe_reset_window(now);
                        for entry in &registry.breakers {
                            entry.value().maybe_reset_window(now);
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("breaker stats sweep shutting down");
                        break;
                    }
                }
            }
        })
    }
}
