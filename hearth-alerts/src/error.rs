use thiserror::Error;

/// §7 error kinds as the alert engine encounters them. Rule evaluation and
/// notification failures are always logged + counted, never propagated to
/// the caller of `check_event`.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("invalid alert rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("invalid predicate pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, AlertError>;
