use hearth_config::BackoffSettings;
use rand::Rng;
use std::time::Duration;

/// Delay for attempt `n` (1-based): `min(max_delay, base_delay *
/// multiplier^(n-1)) * (1 + U(-jitter, +jitter))`, floored at 0.1s (§4.3
/// retry policy — the same formula the connection manager uses for its own
/// reconnect backoff).
pub fn retry_delay(settings: &BackoffSettings, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let scaled = settings.base_delay.as_secs_f64() * settings.multiplier.powi(exponent as i32);
    let bounded = scaled.min(settings.max_delay.as_secs_f64());

    let jitter_factor = if settings.jitter > 0.0 {
        1.0 + rand::rng().random_range(-settings.jitter..=settings.jitter)
    } else {
        1.0
    };

    Duration::from_secs_f64((bounded * jitter_factor).max(0.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_until_capped() {
        let settings = BackoffSettings {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
            max_retries: 5,
        };
        assert_eq!(retry_delay(&settings, 1), Duration::from_secs(1));
        assert_eq!(retry_delay(&settings, 2), Duration::from_secs(2));
        assert_eq!(retry_delay(&settings, 10), Duration::from_secs(60));
    }
}
