//! Retry policy for upstream marketplace calls.

use sellerbridge_types::UpstreamError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Additive buffer on top of a server-provided retry hint, so the retry
/// lands just after the limit window rolls over rather than on its edge.
const RETRY_AFTER_BUFFER: Duration = Duration::from_millis(200);

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Jitter fraction applied to computed delays (±20% = 0.2)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
            jitter: 0.2,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    After(Duration),
}

/// Decide whether a failure is retryable and with what delay.
///
/// A 429 honors the server hint, defensively: the value is not trusted
/// unconditionally but clamped to `max_delay` (plus a small additive
/// buffer). Auth and client rejections never retry.
pub fn determine_retry(config: &RetryConfig, error: &UpstreamError, attempt: u32) -> RetryDecision {
    match error {
        UpstreamError::RateLimited { retry_after_secs } => {
            let delay = match retry_after_secs {
                Some(secs) => {
                    Duration::from_secs(*secs).min(config.max_delay) + RETRY_AFTER_BUFFER
                }
                None => backoff_delay(config, attempt),
            };
            RetryDecision::After(delay)
        }
        UpstreamError::ServerError { .. }
        | UpstreamError::Timeout { .. }
        | UpstreamError::Network { .. } => RetryDecision::After(backoff_delay(config, attempt)),
        UpstreamError::AuthRejected { .. } | UpstreamError::ClientRejected { .. } => {
            RetryDecision::NoRetry
        }
    }
}

/// Exponential backoff with jitter, capped at `max_delay`.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.as_millis() as f64 * config.factor.powi(attempt as i32);
    let capped = exp.min(config.max_delay.as_millis() as f64);
    let jitter_range = capped * config.jitter;
    let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
    Duration::from_millis((capped + jitter).max(0.0) as u64)
}

/// Apply a retry decision: sleep and report whether to try again.
pub async fn apply_retry(
    decision: RetryDecision,
    attempt: u32,
    max_attempts: u32,
    endpoint: &str,
) -> bool {
    match decision {
        RetryDecision::NoRetry => {
            debug!(endpoint = %endpoint, "non-retryable error, stopping");
            false
        }
        RetryDecision::After(_) if attempt + 1 >= max_attempts => {
            debug!(endpoint = %endpoint, attempts = max_attempts, "retry budget exhausted");
            false
        }
        RetryDecision::After(delay) => {
            info!(
                endpoint = %endpoint,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying upstream call"
            );
            sleep(delay).await;
            true
        }
    }
}
