//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Un-jittered delay for `attempt` (0-indexed): `initial × multiplier^attempt`,
/// capped at `max`.
pub fn base_delay(attempt: u32, initial: Duration, multiplier: f64, max: Duration) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let delay_ms = initial.as_millis() as f64 * multiplier.max(1.0).powi(exponent);
    let max_ms = max.as_millis() as f64;

    if !delay_ms.is_finite() || delay_ms >= max_ms {
        return max;
    }
    Duration::from_millis(delay_ms as u64)
}

/// Calculate exponential backoff delay with jitter.
///
/// The result lies in `[base, base × 1.5]` and never exceeds `max`.
pub fn calculate_backoff(attempt: u32, initial: Duration, multiplier: f64, max: Duration) -> Duration {
    let base = base_delay(attempt, initial, multiplier, max);

    // Apply jitter (0 to 50% of the delay)
    let jitter_range = base.as_millis() as u64 / 2;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };

    (base + Duration::from_millis(jitter)).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_millis(2000);

    #[test]
    fn test_backoff_calculation() {
        for attempt in 0..4 {
            let base = 100 * 2u128.pow(attempt);
            for _ in 0..50 {
                let d = calculate_backoff(attempt, INITIAL, 2.0, MAX).as_millis();
                assert!(d >= base, "attempt {} delay {} below {}", attempt, d, base);
                assert!(d <= base * 3 / 2, "attempt {} delay {} above 1.5x", attempt, d);
            }
        }
    }

    #[test]
    fn test_backoff_clipped_to_max() {
        for _ in 0..50 {
            let d = calculate_backoff(10, INITIAL, 2.0, MAX);
            assert_eq!(d, MAX);
        }
        // 1600ms base with jitter up to 2400ms, clipped.
        for _ in 0..50 {
            let d = calculate_backoff(4, INITIAL, 2.0, MAX).as_millis();
            assert!((1600..=2000).contains(&d));
        }
    }

    #[test]
    fn test_base_delay_handles_overflow() {
        assert_eq!(base_delay(u32::MAX, INITIAL, 2.0, MAX), MAX);
        assert_eq!(base_delay(0, INITIAL, 2.0, MAX), INITIAL);
        assert_eq!(base_delay(3, INITIAL, 1.5, MAX), Duration::from_millis(337));
    }
}
