//! Retry delays

use std::time::Duration;

/// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`.
///
/// Retry 0 is the first attempt and has no delay. Saturates instead of
/// overflowing for large retry counts.
pub fn retry_delay(retry: u32, initial: Duration) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
    initial.saturating_mul(factor)
}

/// The full delay sequence for `max_retries` retries.
pub fn schedule(max_retries: u32, initial: Duration) -> Vec<Duration> {
    (1..=max_retries).map(|r| retry_delay(r, initial)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(retry_delay(0, Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_delay_doubles() {
        let ms = Duration::from_millis;
        assert_eq!(schedule(2, ms(10)), vec![ms(10), ms(20)]);
        assert_eq!(schedule(4, ms(250)), vec![ms(250), ms(500), ms(1000), ms(2000)]);
        assert!(schedule(0, ms(10)).is_empty());
    }

    #[test]
    fn test_delay_saturates() {
        let d = retry_delay(200, Duration::from_secs(1));
        assert_eq!(d, Duration::from_secs(1).saturating_mul(u32::MAX));
    }
}
