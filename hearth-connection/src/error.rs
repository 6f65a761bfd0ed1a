use thiserror::Error;

/// §7 error kinds as they apply to the connection manager. Transport and
/// decode failures never propagate past `run()`; they drive a state
/// transition and a logged, counted error instead.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected by upstream")]
    AuthRejected,

    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("subscription acknowledgement timed out")]
    SubscriptionTimeout,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("channel closed by peer")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
