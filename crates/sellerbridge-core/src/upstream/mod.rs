//! Protected outbound path to the marketplace API.
//!
//! - [`client`] - breaker-protected request execution with retry, cache
//!   and fallback
//! - [`endpoint`] - endpoint class normalization, breaker presets, SLA
//!   latency tracking
//! - [`retry`] - backoff policy with defensive retry-after handling
//! - [`transport`] - reqwest-backed wire transport

pub mod client;
pub mod endpoint;
pub mod retry;
pub mod transport;

pub use client::{ProtectedUpstreamClient, RequestOptions, ResponseSource, UpstreamResponse};
pub use endpoint::{EndpointClass, SlaStats, SlaTracker};
pub use retry::{RetryConfig, RetryDecision};
pub use transport::HttpTransport;
