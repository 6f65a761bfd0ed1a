use hearth_config::BackoffSettings;
use rand::Rng;
use std::time::Duration;

/// Delay for attempt `n` (1-based): `min(max_delay, base_delay *
/// multiplier^(n-1)) * (1 + U(-jitter, +jitter))`, floored at 0.1s (§4.1).
pub fn retry_delay(settings: &BackoffSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let scaled = settings.base_delay.as_secs_f64() * settings.multiplier.powi(exponent as i32);
    let bounded = scaled.min(settings.max_delay.as_secs_f64());

    let jitter_factor = if settings.jitter > 0.0 {
        1.0 + rand::rng().random_range(-settings.jitter..=settings.jitter)
    } else {
        1.0
    };

    let jittered = (bounded * jitter_factor).max(0.1);
    Duration::from_secs_f64(jittered)
}

/// `false` once `max_retries` (>= 0) attempts have been made; `max_retries
/// == -1` means retry forever.
pub fn retries_exhausted(settings: &BackoffSettings, attempts_made: u64) -> bool {
    settings.max_retries >= 0 && attempts_made >= settings.max_retries as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BackoffSettings {
        BackoffSettings {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
            max_retries: -1,
        }
    }

    #[test]
    fn grows_exponentially_until_capped() {
        let s = settings();
        assert_eq!(retry_delay(&s, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(&s, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(&s, 3), Duration::from_secs(4));
        assert_eq!(retry_delay(&s, 10), Duration::from_secs(300));
    }

    #[test]
    fn floors_at_one_tenth_second() {
        let mut s = settings();
        s.base_delay = Duration::from_millis(1);
        assert_eq!(retry_delay(&s, 1), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let mut s = settings();
        s.jitter = 0.1;
        for _ in 0..100 {
            let delay = retry_delay(&s, 3).as_secs_f64();
            assert!((3.6..=4.4).contains(&delay), "delay {delay} outside jittered range");
        }
    }

    #[test]
    fn infinite_retries_never_exhaust() {
        let s = settings();
        assert!(!retries_exhausted(&s, 1_000_000));
    }

    #[test]
    fn finite_retries_exhaust_at_bound() {
        let mut s = settings();
        s.max_retries = 3;
        assert!(!retries_exhausted(&s, 2));
        assert!(retries_exhausted(&s, 3));
    }
}
