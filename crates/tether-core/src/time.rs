//! Wall-clock helpers for liveness bookkeeping
//!
//! Timestamps are unix milliseconds so they fit in an `AtomicU64` and go
//! over the API unchanged.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds, or 0 if the clock predates the epoch.
///
/// # Examples
/// ```
/// use tether_core::time::current_time_millis;
///
/// assert!(current_time_millis() > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Oldest `last_seen_at` still considered alive at `now` under `window`
pub fn liveness_cutoff(now: u64, window: Duration) -> u64 {
    now.saturating_sub(window.as_millis() as u64)
}

/// How long an agent last seen at `last_seen` has been silent at `now`
pub fn silence(now: u64, last_seen: u64) -> Duration {
    Duration::from_millis(now.saturating_sub(last_seen))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_cutoff() {
        assert_eq!(liveness_cutoff(100_000, Duration::from_secs(90)), 10_000);
        // Windows longer than the clock clamp to the epoch
        assert_eq!(liveness_cutoff(5_000, Duration::from_secs(90)), 0);
    }

    #[test]
    fn test_silence() {
        assert_eq!(silence(12_500, 10_000), Duration::from_millis(2_500));
        // A touch racing the sweep can land after `now`
        assert_eq!(silence(10_000, 12_500), Duration::ZERO);
    }
}
