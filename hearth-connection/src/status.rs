use crate::state::ConnectionState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cumulative counters plus current state, as returned by `status()` (§4.1).
#[derive(Debug)]
pub struct ConnectionStatus {
    state: Mutex<ConnectionState>,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    decode_errors: AtomicU64,
    last_error: Mutex<Option<String>>,
    retry_count: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ConnectionStatusSnapshot {
    pub state: ConnectionState,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub decode_errors: u64,
    pub last_error: Option<String>,
    pub retry_count: u64,
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
            retry_count: AtomicU64::new(0),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("status mutex poisoned") = state;
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets the retry counter to zero, per §4.1 "on any successful
    /// authentication".
    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.retry_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.retry_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().expect("status mutex poisoned") = Some(error.into());
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatusSnapshot {
        ConnectionStatusSnapshot {
            state: *self.state.lock().expect("status mutex poisoned"),
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            last_error: self.last_error.lock().expect("status mutex poisoned").clone(),
            retry_count: self.retry_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_retry_count() {
        let status = ConnectionStatus::new();
        status.record_failure("timeout");
        status.record_failure("timeout");
        assert_eq!(status.snapshot().retry_count, 2);

        status.record_success();
        assert_eq!(status.snapshot().retry_count, 0);
        assert_eq!(status.snapshot().successes, 1);
    }
}
