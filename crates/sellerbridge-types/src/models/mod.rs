//! Dashboard-facing models.
//!
//! Everything here crosses the boundary to the operator dashboard or the
//! ops API and is therefore serde-serializable.

mod alert;
mod ingest;
mod report;
mod snapshot;

pub use alert::{Alert, AlertSeverity};
pub use ingest::IngestReceipt;
pub use report::{HealthReport, OverallStatus};
pub use snapshot::{AlertCounts, BreakerCounts, MetricsSnapshot, ResourceUsage, TenantCounts, WebhookCounters};
