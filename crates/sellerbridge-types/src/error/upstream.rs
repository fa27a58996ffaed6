//! Upstream marketplace API call errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified outcome of a failed upstream marketplace call.
///
/// Classification drives two separate decisions downstream: whether the
/// attempt may be retried, and whether it charges the circuit breaker's
/// failure counters. Auth and client rejections do neither.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum UpstreamError {
    /// Rate limited by the marketplace (429)
    #[error("Rate limited by upstream{}", retry_after_secs.map(|s| format!(", retry after {}s", s)).unwrap_or_default())]
    RateLimited {
        /// Server-provided retry hint in seconds, if any
        retry_after_secs: Option<u64>,
    },

    /// Upstream server error (5xx)
    #[error("Upstream server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Credentials rejected (401/403) - caller must refresh the token
    #[error("Upstream rejected credentials with status {status}")]
    AuthRejected { status: u16 },

    /// Request rejected as malformed or targeting a missing resource (400/404)
    #[error("Upstream rejected request with status {status}: {message}")]
    ClientRejected { status: u16, message: String },

    /// Call exceeded its allotted time budget
    #[error("Upstream call timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    /// Transport-level failure (connection refused, DNS, TLS, ...)
    #[error("Upstream network error: {message}")]
    Network { message: String },
}

impl UpstreamError {
    /// Classify a non-success HTTP status into an error.
    ///
    /// Returns `None` for 2xx (not an error) and maps everything else to
    /// the closest variant. Unknown 4xx statuses classify as client
    /// rejections so they surface immediately without retries.
    pub fn from_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(Self::RateLimited { retry_after_secs }),
            401 | 403 => Some(Self::AuthRejected { status }),
            500..=599 => Some(Self::ServerError { status, message }),
            _ => Some(Self::ClientRejected { status, message }),
        }
    }

    /// Check if this failure may be retried with backoff.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    /// Check if this failure charges the circuit breaker.
    ///
    /// Auth rejections (credentials problem, not service health), client
    /// rejections (caller bug) and rate limits (handled by backoff) do not
    /// open circuits on their own.
    pub const fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. } | Self::Timeout { .. } | Self::Network { .. }
        )
    }

    /// Server-provided retry hint, if this is a rate limit with one.
    pub const fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    /// Equivalent HTTP status code for this error.
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited { .. } => 429,
            Self::ServerError { status, .. }
            | Self::AuthRejected { status }
            | Self::ClientRejected { status, .. } => *status,
            Self::Timeout { .. } => 504,
            Self::Network { .. } => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(UpstreamError::from_status(200, String::new(), None).is_none());
        assert!(matches!(
            UpstreamError::from_status(429, String::new(), Some(10)),
            Some(UpstreamError::RateLimited { retry_after_secs: Some(10) })
        ));
        assert!(matches!(
            UpstreamError::from_status(503, "overloaded".to_string(), None),
            Some(UpstreamError::ServerError { status: 503, .. })
        ));
        assert!(matches!(
            UpstreamError::from_status(401, String::new(), None),
            Some(UpstreamError::AuthRejected { status: 401 })
        ));
        assert!(matches!(
            UpstreamError::from_status(404, "gone".to_string(), None),
            Some(UpstreamError::ClientRejected { status: 404, .. })
        ));
    }

    #[test]
    fn test_retryable_vs_circuit_tripping() {
        let rate_limited = UpstreamError::RateLimited { retry_after_secs: None };
        let auth = UpstreamError::AuthRejected { status: 401 };
        let server = UpstreamError::ServerError { status: 500, message: "boom".to_string() };

        assert!(rate_limited.is_retryable());
        assert!(!rate_limited.should_trip_circuit());

        assert!(!auth.is_retryable());
        assert!(!auth.should_trip_circuit());

        assert!(server.is_retryable());
        assert!(server.should_trip_circuit());
    }
}
