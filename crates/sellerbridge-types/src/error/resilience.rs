//! Resilience-layer errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::upstream::UpstreamError;

/// Errors surfaced by the resilience layer to its callers.
///
/// Duplicate webhook delivery is intentionally absent: a duplicate is a
/// successful no-op reported via the ingest receipt, never an error.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ResilienceError {
    /// Circuit breaker rejected the call without contacting upstream
    #[error("Circuit '{name}' is open, retry in {retry_in_ms}ms")]
    CircuitOpen { name: String, retry_in_ms: u64 },

    /// Operation exceeded its allotted budget
    #[error("Operation timed out after {budget_ms}ms")]
    OperationTimeout { budget_ms: u64 },

    /// Tenant pre-emptively skipped because it is already known to be failing
    #[error("Tenant {tenant_id} skipped by isolation policy")]
    IsolationSkip { tenant_id: String },

    /// Upstream call failed after classification
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// No active credential available for the tenant
    #[error("No active credential for tenant {tenant_id}")]
    CredentialMissing { tenant_id: String },

    /// Durable work queue rejected or failed the enqueue
    #[error("Work queue unavailable: {message}")]
    QueueUnavailable { message: String },

    /// Unexpected internal state (bugs)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ResilienceError {
    /// Check if this error indicates the operation could succeed later.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::CircuitOpen { .. }
            | Self::OperationTimeout { .. }
            | Self::IsolationSkip { .. }
            | Self::QueueUnavailable { .. } => true,
            Self::Upstream(e) => e.is_retryable(),
            Self::CredentialMissing { .. } | Self::Internal { .. } => false,
        }
    }

    /// Check if this failure charges the circuit breaker's failure counters.
    pub const fn should_trip_circuit(&self) -> bool {
        match self {
            Self::OperationTimeout { .. } => true,
            Self::Upstream(e) => e.should_trip_circuit(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let open = ResilienceError::CircuitOpen { name: "items".to_string(), retry_in_ms: 100 };
        let missing = ResilienceError::CredentialMissing { tenant_id: "t1".to_string() };

        assert!(open.is_transient());
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_circuit_charge_delegates_to_upstream() {
        let auth: ResilienceError = UpstreamError::AuthRejected { status: 403 }.into();
        let timeout = ResilienceError::OperationTimeout { budget_ms: 200 };

        assert!(!auth.should_trip_circuit());
        assert!(timeout.should_trip_circuit());
    }
}
