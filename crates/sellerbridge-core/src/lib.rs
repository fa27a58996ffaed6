//! # Sellerbridge Core
//!
//! Resilience layer for a multi-tenant marketplace integration.
//!
//! ## Architecture
//!
//! ```text
//! sellerbridge-core/src/
//! ├── breaker/       # Circuit breaker state machine + keyed registry
//! ├── upstream/      # Protected marketplace client (retry, cache, fallback)
//! ├── tenants/       # Multi-tenant isolation processor + health sweep
//! ├── webhook/       # Latency-bounded ingestion (dedup, emergency buffer)
//! ├── monitor/       # Metrics snapshots, alerting, health reports
//! ├── external.rs    # Narrow collaborator traits (transport, queue, cache)
//! ├── context.rs     # Constructed lifecycle object replacing globals
//! └── telemetry.rs   # tracing + Prometheus metrics initialization
//! ```
//!
//! Callers construct a [`context::ResilienceContext`], `start()` it, and
//! route all outbound marketplace traffic through
//! [`upstream::ProtectedUpstreamClient`] / [`tenants::TenantProcessor`] and
//! all inbound webhooks through [`webhook::WebhookPipeline`]. The
//! [`monitor::ResilienceMonitor`] observes all of the above on an
//! independent read path.

#![allow(
    clippy::significant_drop_tightening,
    reason = "lock guards in async code require careful lifetime management"
)]
#![cfg_attr(test, allow(clippy::panic, clippy::print_stdout, clippy::float_cmp))]

pub mod breaker;
pub mod context;
pub mod external;
pub mod monitor;
pub mod telemetry;
pub mod tenants;
pub mod upstream;
pub mod webhook;

// Re-export commonly used types
pub use breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitConfig, CircuitState};
pub use context::{ContextConfig, ResilienceContext};
pub use sellerbridge_types::{ResilienceError, Result, UpstreamError};
