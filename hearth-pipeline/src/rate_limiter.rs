use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Classic token bucket: refills continuously at `rate` tokens/sec up to
/// `burst` capacity, `try_acquire` takes one token or fails (§4.2
/// "A rate limiter (token bucket; default 1000 events/s) may shed
/// submissions before they enter the queue").
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec as f64;
        Self {
            rate_per_sec: rate,
            capacity: rate,
            state: Mutex::new(BucketState {
                tokens: rate,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket mutex poisoned");
        let elapsed = state.last_refill.elapsed();
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate_per_sec).min(self.capacity);
        state.last_refill = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_burst_capacity_immediately() {
        let bucket = TokenBucket::new(5);
        for _ in 0..5 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(1000);
        for _ in 0..1000 {
            bucket.try_acquire();
        }
        assert!(!bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.try_acquire());
    }
}
