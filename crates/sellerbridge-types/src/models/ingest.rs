//! Webhook ingestion receipts.

use serde::{Deserialize, Serialize};

/// Outcome of one webhook ingestion.
///
/// `success` is always true toward the sender — the inbound protocol
/// retries on anything else, so every failure mode is absorbed internally
/// and reported only through the flags below.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IngestReceipt {
    pub success: bool,
    pub response_time_ms: u64,
    /// Event was already accepted within the dedup window; nothing was done
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    /// Event was diverted to the emergency buffer instead of the normal path
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub emergency: bool,
}

impl IngestReceipt {
    pub const fn accepted(response_time_ms: u64) -> Self {
        Self { success: true, response_time_ms, duplicate: false, emergency: false }
    }

    pub const fn duplicate(response_time_ms: u64) -> Self {
        Self { success: true, response_time_ms, duplicate: true, emergency: false }
    }

    pub const fn emergency(response_time_ms: u64) -> Self {
        Self { success: true, response_time_ms, duplicate: false, emergency: true }
    }
}
