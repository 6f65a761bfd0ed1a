use crate::backoff::retry_delay;
use crate::error::ConnectionError;
use crate::frames::{decode_event, parse_server_frame, ClientFrame, ServerFrame};
use crate::registry::RegistryCache;
use crate::state::{ConnectionState, StateChange};
use crate::status::{ConnectionStatus, ConnectionStatusSnapshot};
use crate::transport::Transport;
use async_trait::async_trait;
use hearth_config::ConnectionSettings;
use hearth_model::Event;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Produces a fresh transport on every connection attempt. Production code
/// dials the real upstream URL; tests substitute a queue of fake
/// transports to drive the state machine deterministically.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectionError>;
}

pub struct WebSocketTransportFactory {
    pub url: String,
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn connect(&self) -> Result<Box<dyn Transport>, ConnectionError> {
        let transport = crate::transport::WebSocketTransport::connect(&self.url).await?;
        Ok(Box::new(transport))
    }
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const STATE_CHANNEL_CAPACITY: usize = 64;

/// Long-lived connection to the upstream hub (§4.1). `start`/`stop`/`status`
/// plus two output streams are the entire public contract; the handshake,
/// retry loop, and registry cache are internal.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    factory: Arc<dyn TransportFactory>,
    status: Arc<ConnectionStatus>,
    registry: Arc<RegistryCache>,
    event_tx: mpsc::Sender<Event>,
    event_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    state_tx: broadcast::Sender<StateChange>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings, factory: Arc<dyn TransportFactory>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            settings,
            factory,
            status: Arc::new(ConnectionStatus::new()),
            registry: Arc::new(RegistryCache::new()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            state_tx,
            stop_tx,
            stop_rx,
            handle: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<RegistryCache> {
        self.registry.clone()
    }

    /// Idempotent: returns immediately if a run loop is already active.
    /// Issues the first connection attempt asynchronously; does not wait
    /// for it to succeed.
    pub async fn start(self: &Arc<Self>) {
        let mut handle_slot = self.handle.lock().await;
        if handle_slot.is_some() {
            return;
        }

        let this = Arc::clone(self);
        *handle_slot = Some(tokio::spawn(async move {
            this.run().await;
        }));
    }

    /// Cancels the run loop at its next suspension point and releases the
    /// transport. Safe to call even if `start` was never called.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub fn status(&self) -> ConnectionStatusSnapshot {
        self.status.snapshot()
    }

    /// Takes ownership of the event stream; only the first caller receives
    /// `Some`.
    pub async fn take_event_stream(&self) -> Option<mpsc::Receiver<Event>> {
        self.event_rx.lock().await.take()
    }

    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, from: ConnectionState, to: ConnectionState, reason: Option<String>) {
        self.status.set_state(to);
        info!(from = from.as_str(), to = to.as_str(), "connection state transition");
        let _ = self.state_tx.send(StateChange { from, to, reason });
    }

    async fn should_stop(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u64 = 0;
        let mut state = ConnectionState::Disconnected;

        loop {
            if self.should_stop().await {
                self.set_state(state, ConnectionState::Disconnected, Some("stopped".to_string()));
                return;
            }

            attempt += 1;
            self.status.record_attempt();
            self.set_state(state, ConnectionState::Connecting, None);
            state = ConnectionState::Connecting;

            match self.connect_and_run(&mut state).await {
                Ok(()) => {
                    // Graceful stop requested mid-session.
                    self.set_state(state, ConnectionState::Disconnected, Some("stopped".to_string()));
                    return;
                }
                Err(e) => {
                    warn!(error = %e, attempt, "connection attempt failed");
                    self.status.record_failure(e.to_string());
                    self.set_state(state, ConnectionState::Backoff, Some(e.to_string()));
                    state = ConnectionState::Backoff;
                }
            }

            if self.settings.backoff.max_retries >= 0
                && self.status.snapshot().retry_count >= self.settings.backoff.max_retries as u64
            {
                self.set_state(state, ConnectionState::Disconnected, Some("retries exhausted".to_string()));
                return;
            }

            let delay = retry_delay(&self.settings.backoff, attempt as u32);
            debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
            if self.sleep_or_stop(delay).await {
                self.set_state(state, ConnectionState::Disconnected, Some("stopped".to_string()));
                return;
            }
        }
    }

    /// Runs one full session: connect, authenticate, subscribe, then pump
    /// events until the channel drops or `stop()` is called. `Ok(())`
    /// means the caller should stop entirely (graceful shutdown); `Err`
    /// means the session ended and the caller should back off and retry.
    async fn connect_and_run(&self, state: &mut ConnectionState) -> Result<(), ConnectionError> {
        let mut transport = self.factory.connect().await?;

        transport
            .send_text(
                ClientFrame::Auth {
                    access_token: self.settings.upstream_token.clone(),
                }
                .to_json_string(),
            )
            .await?;

        match timeout(self.settings.subscribe_ack_timeout, transport.recv_text()).await {
            Ok(Ok(Some(text))) => match parse_server_frame(&text).map_err(|_| ConnectionError::AuthRejected)? {
                ServerFrame::AuthOk => {}
                ServerFrame::AuthInvalid { message } => return Err(ConnectionError::SubscriptionRejected(message)),
                _ => return Err(ConnectionError::AuthRejected),
            },
            Ok(Ok(None)) => return Err(ConnectionError::ChannelClosed),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectionError::SubscriptionTimeout),
        }

        *state = ConnectionState::Authenticated;
        self.set_state(ConnectionState::Connecting, ConnectionState::Authenticated, None);
        self.status.record_success();

        for (idx, event_type) in self.settings.subscribed_event_types.iter().enumerate() {
            let id = idx as u64 + 1;
            transport
                .send_text(
                    ClientFrame::SubscribeEvents {
                        id,
                        event_type: event_type.clone(),
                    }
                    .to_json_string(),
                )
                .await?;

            match timeout(self.settings.subscribe_ack_timeout, transport.recv_text()).await {
                Ok(Ok(Some(text))) => match parse_server_frame(&text) {
                    Ok(ServerFrame::SubscriptionResult { success: true, .. }) => {}
                    Ok(ServerFrame::SubscriptionResult { success: false, error, .. }) => {
                        return Err(ConnectionError::SubscriptionRejected(error.unwrap_or_default()));
                    }
                    _ => return Err(ConnectionError::SubscriptionRejected("unexpected frame".to_string())),
                },
                Ok(Ok(None)) => return Err(ConnectionError::ChannelClosed),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ConnectionError::SubscriptionTimeout),
            }
        }

        *state = ConnectionState::Subscribed;
        self.set_state(ConnectionState::Authenticated, ConnectionState::Subscribed, None);

        loop {
            if self.should_stop().await {
                return Ok(());
            }

            let mut stop_rx = self.stop_rx.clone();
            tokio::select! {
                biased;
                _ = stop_rx.changed() => return Ok(()),
                frame = transport.recv_text() => match frame {
                    Ok(Some(text)) => self.handle_inbound(&text),
                    Ok(None) => return Err(ConnectionError::ChannelClosed),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    fn handle_inbound(&self, text: &str) {
        match parse_server_frame(text) {
            Ok(ServerFrame::Event { event_type, time_fired_ns, data }) => {
                if let Some(event) = decode_event(&event_type, time_fired_ns, &data) {
                    if self.event_tx.try_send(event).is_err() {
                        warn!("event stream full, dropping event from connection manager");
                    }
                }
            }
            Ok(ServerFrame::RegistryUpdate { data, .. }) => {
                self.registry.apply_update(&data);
            }
            Ok(ServerFrame::SubscriptionResult { .. } | ServerFrame::AuthOk | ServerFrame::AuthInvalid { .. }) => {
                debug!("ignoring late handshake frame while subscribed");
            }
            Ok(ServerFrame::Unknown) => {
                debug!("dropping unrecognized frame type");
            }
            Err(e) => {
                self.status.record_decode_error();
                warn!(error = %e, "dropping malformed frame");
            }
        }
    }

    /// Returns `true` if a stop was observed during the sleep.
    async fn sleep_or_stop(&self, delay: Duration) -> bool {
        let mut stop_rx = self.stop_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = stop_rx.changed() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeTransport, ScriptedFrame};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct QueuedFactory {
        transports: StdMutex<Vec<FakeTransport>>,
    }

    #[async_trait]
    impl TransportFactory for QueuedFactory {
        async fn connect(&self) -> Result<Box<dyn Transport>, ConnectionError> {
            let mut queue = self.transports.lock().unwrap();
            if queue.is_empty() {
                return Err(ConnectionError::Transport("no more scripted transports".to_string()));
            }
            Ok(Box::new(queue.remove(0)))
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            upstream_url: "wss://hub.local/api/websocket".to_string(),
            upstream_token: "tok".to_string(),
            subscribed_event_types: vec!["state_changed".to_string()],
            subscribe_ack_timeout: Duration::from_millis(200),
            backoff: hearth_config::BackoffSettings {
                base_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_delay: Duration::from_millis(50),
                jitter: 0.0,
                max_retries: -1,
            },
        }
    }

    #[tokio::test]
    async fn happy_path_authenticates_subscribes_and_emits_events() {
        let transport = FakeTransport::new(vec![
            ScriptedFrame::Text(r#"{"type":"auth_ok"}"#.to_string()),
            ScriptedFrame::Text(r#"{"id":1,"type":"result","success":true}"#.to_string()),
            ScriptedFrame::Text(
                r#"{"id":1,"type":"event","event":{"event_type":"state_changed","time_fired":"2025-01-01T00:00:00Z","data":{"entity_id":"light.kitchen","new_state":{"state":"on","attributes":{}}}}}"#
                    .to_string(),
            ),
            ScriptedFrame::Close,
        ]);
        let factory = Arc::new(QueuedFactory {
            transports: StdMutex::new(vec![transport]),
        });
        let manager = Arc::new(ConnectionManager::new(settings(), factory));
        let mut events = manager.take_event_stream().await.unwrap();

        manager.start().await;
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("should receive an event before timeout")
            .expect("channel should stay open");
        assert_eq!(event.entity_id, "light.kitchen");

        manager.stop().await;
        assert_eq!(manager.status().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn auth_invalid_transitions_to_backoff_and_retries() {
        let first = FakeTransport::new(vec![ScriptedFrame::Text(
            r#"{"type":"auth_invalid","message":"bad token"}"#.to_string(),
        )]);
        let second = FakeTransport::new(vec![ScriptedFrame::Close]);
        let factory = Arc::new(QueuedFactory {
            transports: StdMutex::new(vec![first, second]),
        });
        let manager = Arc::new(ConnectionManager::new(settings(), factory));

        manager.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop().await;

        let snapshot = manager.status();
        assert!(snapshot.failures >= 1);
    }

    #[tokio::test]
    async fn registry_update_does_not_produce_an_event() {
        let transport = FakeTransport::new(vec![
            ScriptedFrame::Text(r#"{"type":"auth_ok"}"#.to_string()),
            ScriptedFrame::Text(r#"{"id":1,"type":"result","success":true}"#.to_string()),
            ScriptedFrame::Text(
                r#"{"id":1,"type":"event","event":{"event_type":"entity_registry_updated","data":{"entity_id":"light.kitchen","area_id":"kitchen"}}}"#
                    .to_string(),
            ),
            ScriptedFrame::Close,
        ]);
        let factory = Arc::new(QueuedFactory {
            transports: StdMutex::new(vec![transport]),
        });
        let manager = Arc::new(ConnectionManager::new(settings(), factory));
        let mut events = manager.take_event_stream().await.unwrap();
        let registry = manager.registry();

        manager.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop().await;

        assert!(events.try_recv().is_err());
        assert_eq!(
            registry.lookup("light.kitchen").unwrap().get("area_id"),
            Some(&hearth_model::Value::String("kitchen".to_string()))
        );
    }
}
