//! Reconnect backoff
//!
//! Delay between reconnect attempts doubles with every failed attempt and is
//! capped, so a long outage settles into a fixed retry spacing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before the first reconnect attempt
pub const DEFAULT_BASE_MS: u64 = 30_000;

/// Upper bound for any reconnect delay
pub const DEFAULT_MAX_MS: u64 = 300_000;

/// Compute the delay before reconnect attempt number `attempt` (1-based)
///
/// `delay = min(base_ms * 2^(attempt - 1), max_ms)`. Attempt 0 is treated
/// as attempt 1, and arithmetic overflow saturates at `max_ms`.
pub fn compute_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(max_ms)
}

/// Configured backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_MS,
            max_ms: DEFAULT_MAX_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Delay before reconnect attempt number `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(compute_backoff_delay(attempt, self.base_ms, self.max_ms))
    }
}
