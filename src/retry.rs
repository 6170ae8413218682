//! Backoff schedule for retried collaborator calls

use rand::Rng;
use std::time::Duration;

/// Delay before retry `attempt` (1-based): `initial * 2^(attempt-1)`
/// capped at `max`, plus up to 50% jitter
pub(crate) fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = initial.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
    let base = exp.min(max);
    let jitter_ms = base.as_millis() as u64 / 2;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    base + Duration::from_millis(jitter)
}
