//! Typed error definitions for Sellerbridge.
//!
//! This module provides a structured error hierarchy with specific error
//! types for the two failure domains. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants
//! - **Composable** via thiserror derive macros

mod resilience;
mod upstream;

pub use resilience::ResilienceError;
pub use upstream::UpstreamError;

/// Standard Result type using ResilienceError.
pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = ResilienceError::CircuitOpen {
            name: "questions".to_string(),
            retry_in_ms: 1500,
        };

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("CircuitOpen"));
        assert!(json.contains("questions"));

        let deserialized: ResilienceError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_upstream_to_resilience_conversion() {
        let upstream = UpstreamError::RateLimited { retry_after_secs: Some(30) };
        let err: ResilienceError = upstream.into();

        let msg = format!("{}", err);
        assert!(msg.contains("30"));
    }
}
