use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Three-state write-path circuit breaker (§4.3): opens after
/// `failure_threshold` consecutive failures, moves to half-open after
/// `timeout` elapses, and closes again on the first success in half-open.
pub struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns `true` if a write attempt should proceed right now. A
    /// half-open transition is applied as a side effect of this call.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if inner.last_failure.is_some_and(|t| t.elapsed() > self.timeout) {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failure_count >= self.failure_threshold {
            inner.state = CircuitState::Open;
        }
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        CircuitBreakerStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.allow_request());
        }
        breaker.record_failure();
        assert!(!breaker.allow_request());
        assert_eq!(breaker.status().state, CircuitState::Open);
    }

    #[test]
    fn moves_to_half_open_after_timeout_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(5));
        breaker.record_failure();
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(10));
        assert!(breaker.allow_request());
        assert_eq!(breaker.status().state, CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.status().state, CircuitState::Closed);
    }
}
