//! Wall-clock helpers
//!
//! Session activity is tracked as milliseconds since the UNIX epoch so that
//! gateways can store it in an `AtomicU64` and the controller can read it
//! without locking.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current UNIX timestamp in milliseconds.
///
/// A clock set before 1970 reads as 0 rather than panicking.
///
/// # Examples
/// ```
/// use pc_core::time::current_time_millis;
///
/// assert!(current_time_millis() > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Time elapsed since a millisecond timestamp; zero if it lies in the future.
pub fn elapsed_since(since_millis: u64) -> Duration {
    Duration::from_millis(current_time_millis().saturating_sub(since_millis))
}

/// Millisecond timestamp `ago` before now, saturating at the epoch.
pub fn millis_ago(ago: Duration) -> u64 {
    current_time_millis().saturating_sub(ago.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_since_past() {
        let then = millis_ago(Duration::from_secs(90));
        let elapsed = elapsed_since(then);
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed < Duration::from_secs(95));
    }

    #[test]
    fn test_elapsed_since_future_is_zero() {
        let future = current_time_millis() + 1_000_000;
        assert_eq!(elapsed_since(future), Duration::ZERO);
    }

    #[test]
    fn test_millis_ago_saturates() {
        assert_eq!(millis_ago(Duration::from_secs(u64::MAX / 1000)), 0);
    }
}
