//! Retry pacing for callers of the queue.

use std::time::Duration;

const MAX_EXPONENT: u32 = 8;
const BASE_DELAY_SECONDS: u64 = 5;

/// Exponential delay before the next flush attempt, capped at 2^8 x 5s.
pub fn backoff_delay(retry_count: u32) -> Duration {
    let exponent = retry_count.min(MAX_EXPONENT);
    Duration::from_secs(2_u64.pow(exponent) * BASE_DELAY_SECONDS)
}
