// Keyhost Engine — Retry Policy
//
// Resubmission is bounded twice: by attempt count and by the cumulative
// slippage escalation. Swaps widen their tolerance by a fixed increment on
// every resubmission; transfers re-broadcast unchanged and only count
// attempts. The delay between attempts is a single fixed value.

use crate::atoms::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOTAL_SLIPPAGE_BPS, DEFAULT_RETRY_DELAY_MS, DEFAULT_SLIPPAGE_INCREMENT_BPS,
};
use crate::atoms::types::SwapParams;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub slippage_increment_bps: u32,
    pub max_total_slippage_bps: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            slippage_increment_bps: DEFAULT_SLIPPAGE_INCREMENT_BPS,
            max_total_slippage_bps: DEFAULT_MAX_TOTAL_SLIPPAGE_BPS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Whether another resubmission is allowed after `attempts` of them.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }

    /// Cumulative escalation for the next swap resubmission, or `None` once
    /// either bound would be exceeded.
    pub fn next_slippage_bps(&self, attempts: u32, current_bps: u32) -> Option<u32> {
        if !self.allows_attempt(attempts) {
            return None;
        }
        let next = current_bps.saturating_add(self.slippage_increment_bps);
        (next <= self.max_total_slippage_bps).then_some(next)
    }
}

/// `base` with its tolerance widened by `increase_bps` basis points.
pub fn escalate(base: &SwapParams, increase_bps: u32) -> SwapParams {
    if increase_bps == 0 {
        return base.clone();
    }
    base.with_slippage(base.slippage + f64::from(increase_bps) / 10_000.0)
}
