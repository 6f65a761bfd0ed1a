/// §4.1 state machine. `BACKOFF` always re-enters `CONNECTING` and re-runs
/// the full handshake; a channel that drops after `SUBSCRIBED` goes straight
/// to `BACKOFF`, never back to `DISCONNECTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    Subscribed,
    Backoff,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Backoff => "backoff",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: Option<String>,
}
