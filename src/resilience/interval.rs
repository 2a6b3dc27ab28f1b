//! Firing period derived from a target's rate.

use std::time::Duration;

/// Smallest period handed to the timer subsystem.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Period used when the rate is not a positive number.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Convert attempts/second into the period between attempts.
///
/// Never returns a zero or negative period: sub-millisecond results clamp to
/// [`MIN_PERIOD`], non-positive or NaN rates (and periods too large to
/// represent) fall back to [`DEFAULT_PERIOD`].
pub fn interval_from_rate(rate: f64) -> Duration {
    if !(rate > 0.0) {
        return DEFAULT_PERIOD;
    }

    match Duration::try_from_secs_f64(1.0 / rate) {
        Ok(period) if period < MIN_PERIOD => MIN_PERIOD,
        Ok(period) => period,
        Err(_) => DEFAULT_PERIOD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_is_reciprocal() {
        assert_eq!(interval_from_rate(1.0), Duration::from_secs(1));
        assert_eq!(interval_from_rate(10.0), Duration::from_millis(100));
        assert_eq!(interval_from_rate(0.5), Duration::from_secs(2));
        assert_eq!(interval_from_rate(4.0), Duration::from_millis(250));
    }

    #[test]
    fn test_low_rates_are_not_truncated() {
        // 1/3 s is not a whole number of milliseconds.
        let period = interval_from_rate(3.0);
        assert!((period.as_secs_f64() - 1.0 / 3.0).abs() < 1e-9);

        let period = interval_from_rate(0.3);
        assert!((period.as_secs_f64() - 1.0 / 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_minimum() {
        assert_eq!(interval_from_rate(1000.0), MIN_PERIOD);
        assert_eq!(interval_from_rate(5000.0), MIN_PERIOD);
        assert_eq!(interval_from_rate(f64::INFINITY), MIN_PERIOD);
    }

    #[test]
    fn test_non_positive_rates_use_default() {
        assert_eq!(interval_from_rate(0.0), DEFAULT_PERIOD);
        assert_eq!(interval_from_rate(-2.0), DEFAULT_PERIOD);
        assert_eq!(interval_from_rate(f64::NAN), DEFAULT_PERIOD);
    }

    #[test]
    fn test_never_zero() {
        for rate in [1e-3, 0.1, 1.0, 999.0, 1e6, 1e12, -1e9] {
            assert!(interval_from_rate(rate) >= MIN_PERIOD, "rate {}", rate);
        }
    }
}
