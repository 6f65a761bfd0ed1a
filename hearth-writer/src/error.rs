use thiserror::Error;

/// §7 error kinds as the writer encounters them.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer is not connected")]
    NotConnected,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend rejected batch with status {status}: {body}")]
    BackendRejected { status: u16, body: String },

    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, WriterError>;
