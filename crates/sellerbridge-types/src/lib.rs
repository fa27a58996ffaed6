//! # Sellerbridge Types
//!
//! Core types, models, and error definitions for the Sellerbridge
//! resilience layer.
//!
//! This crate provides the foundational type system:
//!
//! - **`error`** - Typed error hierarchy for upstream calls and resilience
//!   operations
//! - **`models`** - Dashboard-facing models (alerts, snapshots, reports,
//!   ingest receipts)
//!
//! ## Architecture Role
//!
//! `sellerbridge-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        sellerbridge-types (this crate)
//!                 │
//!                 ▼
//!        sellerbridge-core
//! ```
//!
//! All types are designed to be:
//! - **Serializable** via serde for API/dashboard consumption
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod error;
pub mod models;

// Re-export error types for convenience
pub use error::{ResilienceError, Result, UpstreamError};

// Re-export core model types
pub use models::{
    Alert, AlertCounts, AlertSeverity, BreakerCounts, HealthReport, IngestReceipt,
    MetricsSnapshot, OverallStatus, ResourceUsage, TenantCounts, WebhookCounters,
};
