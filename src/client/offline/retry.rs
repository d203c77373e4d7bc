//! # Retry Policy
//!
//! Decides what happens to a queued item after a failed delivery. There is no
//! per-item backoff: items are retried on the next drain pass (timer,
//! reconnect or manual trigger) until they reach the ceiling.

use crate::client::error::DeliveryError;
use crate::shared::queue::QueueItem;

/// Default retry ceiling
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Retry ceiling and failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts after which an item stops being retried automatically
    pub max_retries: u32,
    /// Retry payload rejections (4xx) like transport failures instead of
    /// parking them immediately
    pub retry_validation_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_validation_errors: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            ..Self::default()
        }
    }

    /// Whether the item is excluded from automatic delivery
    pub fn is_stalled(&self, item: &QueueItem) -> bool {
        item.is_stalled(self.max_retries)
    }

    /// Whether a failure parks the item without counting retries
    pub fn is_terminal(&self, error: &DeliveryError) -> bool {
        !error.is_retryable() && !self.retry_validation_errors
    }
}
