//! Realtime event channel to the game server.
//!
//! [`EventChannel`] is a thin handle that talks to a background transport loop
//! over an unbounded MPSC channel. The loop owns the transport: it speaks the
//! Engine.IO / Socket.IO handshake, answers pings, turns frames into typed
//! [`ServerEvent`]s and reconnects with exponential backoff after a drop.
//! Consumers receive [`ChannelEvent`]s, in arrival order, on the bounded
//! receiver returned from [`EventChannel::connect`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = SocketIoConnector::new(http, &config)?;
//! let (mut channel, mut events) = EventChannel::connect(connector, &config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Connected => channel.emit(ClientEvent::JoinGame { token: token.clone() })?,
//!         ChannelEvent::Event(ServerEvent::NewRound { wahlspruch, .. }) => println!("{wahlspruch}"),
//!         ChannelEvent::Disconnected { will_reconnect: false, .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{Backoff, ClientConfig, ReconnectPolicy};
use crate::engineio::{self, Packet, SocketPacket};
use crate::error::{ClientError, Result};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::{Connector, Transport};

/// What the channel reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The namespace handshake completed. Sent again after every reconnect.
    Connected,
    /// A typed event from the server.
    Event(ServerEvent),
    /// The connection dropped or was shut down.
    Disconnected {
        reason: Option<String>,
        /// `true` when the channel is about to try again on its own.
        will_reconnect: bool,
    },
}

// ── Shared state ────────────────────────────────────────────────────

struct ChannelState {
    connected: AtomicBool,
    session_id: Mutex<Option<String>>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            session_id: Mutex::new(None),
        }
    }
}

// ── Channel handle ──────────────────────────────────────────────────

/// Handle to the realtime game channel.
///
/// [`emit`](Self::emit) queues an event for the transport loop and returns
/// immediately. Emits are only accepted while connected; nothing is buffered
/// across a reconnect.
pub struct EventChannel {
    cmd_tx: mpsc::UnboundedSender<ClientEvent>,
    state: Arc<ChannelState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl EventChannel {
    /// Spawn the transport loop and return a handle plus the event receiver.
    ///
    /// The loop opens its first transport through `connector` right away.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn connect<C: Connector>(
        connector: C,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientEvent>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ChannelState::new());

        let task = tokio::spawn(channel_loop(
            connector,
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
            config.reconnect.clone(),
        ));

        let channel = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (channel, event_rx)
    }

    /// Queue an event for the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] while the channel is connecting,
    /// reconnecting, or after it has shut down.
    pub fn emit(&self, event: ClientEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.cmd_tx
            .send(event)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Close the channel for good. No reconnect follows.
    ///
    /// The receiver yields a final `Disconnected` and then `None`.
    pub async fn disconnect(&mut self) {
        debug!("EventChannel: disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("channel loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("channel loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("channel loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    /// Returns `true` while the namespace handshake is complete.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The Engine.IO session id of the current connection, if any.
    pub async fn session_id(&self) -> Option<String> {
        self.state.session_id.lock().await.clone()
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        // No executor context to drive a graceful close here; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Channel loop ────────────────────────────────────────────────────

/// How one transport session ended.
enum SessionEnd {
    /// Shut down on request; the final `Disconnected` was already emitted.
    Shutdown,
    /// The connection was lost.
    Dropped(Option<String>),
}

/// Connect, run a session, back off, repeat.
async fn channel_loop<C: Connector>(
    connector: C,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientEvent>,
    event_tx: mpsc::Sender<ChannelEvent>,
    state: Arc<ChannelState>,
    mut shutdown_rx: oneshot::Receiver<()>,
    policy: ReconnectPolicy,
) {
    debug!("channel loop started");
    let mut backoff = Backoff::new(policy);

    loop {
        let attempt = tokio::select! {
            attempt = connector.connect() => attempt,
            _ = &mut shutdown_rx => {
                emit_disconnected(&event_tx, &state, Some("client shut down".into()), false).await;
                break;
            }
        };

        let reason = match attempt {
            Ok(transport) => {
                match run_session(
                    transport,
                    &mut cmd_rx,
                    &event_tx,
                    &state,
                    &mut shutdown_rx,
                    &mut backoff,
                )
                .await
                {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => Some(reason),
                }
            }
            Err(e) => {
                warn!("connect attempt failed: {e}");
                None
            }
        };

        let delay = backoff.next_delay();
        match reason {
            // A live session dropped: always tell the consumer.
            Some(reason) => {
                emit_disconnected(&event_tx, &state, reason, delay.is_some()).await;
            }
            None if delay.is_none() => {
                emit_disconnected(
                    &event_tx,
                    &state,
                    Some("could not reach the game server".into()),
                    false,
                )
                .await;
            }
            None => {}
        }

        let Some(delay) = delay else {
            error!(attempts = backoff.attempts(), "giving up on reconnecting");
            break;
        };

        info!(?delay, attempt = backoff.attempts(), "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => {
                emit_disconnected(&event_tx, &state, Some("client shut down".into()), false).await;
                break;
            }
        }
    }

    debug!("channel loop exited");
}

/// Drive one connected transport until it drops or shutdown is requested.
async fn run_session<T: Transport>(
    mut transport: T,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    state: &ChannelState,
    shutdown_rx: &mut oneshot::Receiver<()>,
    backoff: &mut Backoff,
) -> SessionEnd {
    // Anything still queued was emitted for a previous connection.
    while let Ok(stale) = cmd_rx.try_recv() {
        warn!(event = stale.name(), "dropping event queued before reconnect");
    }

    let mut joined = false;
    let mut heartbeat: Option<(Duration, Instant)> = None;

    loop {
        let deadline = heartbeat.map(|(_, at)| at);
        tokio::select! {
            // Branch 1: outgoing event from the handle
            cmd = cmd_rx.recv() => {
                let Some(event) = cmd else {
                    debug!("command channel closed, shutting down channel loop");
                    let _ = transport.close().await;
                    emit_disconnected(event_tx, state, Some("client shut down".into()), false).await;
                    return SessionEnd::Shutdown;
                };
                if !joined {
                    warn!(event = event.name(), "namespace not joined yet, dropping event");
                    continue;
                }
                debug!(event = event.name(), "emitting client event");
                match engineio::encode_event(&event) {
                    Ok(frame) => {
                        if let Err(e) = transport.send(frame).await {
                            error!("transport send error: {e}");
                            return SessionEnd::Dropped(Some(format!("transport send error: {e}")));
                        }
                    }
                    Err(e) => error!("failed to encode ClientEvent: {e}"),
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                if joined {
                    // Emits queued before the shutdown request still go out.
                    while let Ok(event) = cmd_rx.try_recv() {
                        if let Ok(frame) = engineio::encode_event(&event) {
                            let _ = transport.send(frame).await;
                        }
                    }
                    if let Ok(frame) = engineio::encode(&Packet::Message(SocketPacket::Disconnect)) {
                        let _ = transport.send(frame).await;
                    }
                }
                let _ = transport.close().await;
                emit_disconnected(event_tx, state, Some("client shut down".into()), false).await;
                return SessionEnd::Shutdown;
            }

            // Branch 3: the server stopped pinging
            _ = wait_for(deadline) => {
                warn!("no ping from server within the heartbeat window");
                return SessionEnd::Dropped(Some("ping timeout".into()));
            }

            // Branch 4: incoming packet
            incoming = transport.recv() => {
                let text = match incoming {
                    Some(Ok(text)) => text,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Dropped(Some(format!("transport receive error: {e}")));
                    }
                    None => {
                        debug!("transport closed by server");
                        return SessionEnd::Dropped(None);
                    }
                };

                let packet = match engineio::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("failed to decode packet: {e} — raw: {text}");
                        continue;
                    }
                };

                match packet {
                    Packet::Open(handshake) => {
                        debug!(sid = %handshake.sid, "engine.io session opened");
                        let window = Duration::from_millis(
                            handshake.ping_interval.saturating_add(handshake.ping_timeout),
                        );
                        heartbeat = heartbeat_from_now(window);
                        *state.session_id.lock().await = Some(handshake.sid);
                        let connect = engineio::encode(&Packet::Message(SocketPacket::Connect(None)));
                        if let Ok(frame) = connect {
                            if let Err(e) = transport.send(frame).await {
                                return SessionEnd::Dropped(Some(format!("transport send error: {e}")));
                            }
                        }
                    }
                    Packet::Ping(probe) => {
                        if let Some((window, _)) = heartbeat {
                            heartbeat = heartbeat_from_now(window);
                        }
                        if let Ok(frame) = engineio::encode(&Packet::Pong(probe)) {
                            if let Err(e) = transport.send(frame).await {
                                return SessionEnd::Dropped(Some(format!("transport send error: {e}")));
                            }
                        }
                    }
                    Packet::Close => {
                        return SessionEnd::Dropped(Some("server closed the session".into()));
                    }
                    Packet::Message(SocketPacket::Connect(_)) => {
                        if joined {
                            debug!("duplicate namespace connect ignored");
                            continue;
                        }
                        joined = true;
                        state.connected.store(true, Ordering::Release);
                        backoff.reset();
                        info!("game channel connected");
                        emit_event(event_tx, ChannelEvent::Connected).await;
                    }
                    Packet::Message(SocketPacket::Disconnect) => {
                        return SessionEnd::Dropped(Some("server disconnected the client".into()));
                    }
                    Packet::Message(SocketPacket::ConnectError(message)) => {
                        return SessionEnd::Dropped(Some(format!("connection refused: {message}")));
                    }
                    Packet::Message(SocketPacket::Event(tagged)) => {
                        match engineio::decode_event(tagged) {
                            Ok(event) => {
                                debug!(event = event.name(), "server event");
                                emit_event(event_tx, ChannelEvent::Event(event)).await;
                            }
                            Err(e) => warn!("failed to decode server event: {e} — raw: {text}"),
                        }
                    }
                    Packet::Message(SocketPacket::Ack) | Packet::Pong(_) | Packet::Upgrade | Packet::Noop => {}
                }
            }
        }
    }
}

/// A window too large to represent as an instant disables the deadline.
fn heartbeat_from_now(window: Duration) -> Option<(Duration, Instant)> {
    Instant::now().checked_add(window).map(|at| (window, at))
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Emit an event to the event channel.
///
/// Server events drive the round state, so none may be dropped: a full queue
/// holds the transport loop until the consumer catches up.
async fn emit_event(event_tx: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

/// Emit a [`Disconnected`](ChannelEvent::Disconnected) event and update state.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ChannelEvent>,
    state: &ChannelState,
    reason: Option<String>,
    will_reconnect: bool,
) {
    state.connected.store(false, Ordering::Release);
    *state.session_id.lock().await = None;
    emit_event(
        event_tx,
        ChannelEvent::Disconnected {
            reason,
            will_reconnect,
        },
    )
    .await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays scripted packets and records what the loop sends.
    struct ScriptedTransport {
        incoming: VecDeque<Option<std::result::Result<String, ClientError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, packet: String) -> std::result::Result<(), ClientError> {
            self.sent.lock().unwrap().push(packet);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, ClientError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ClientError> {
            Ok(())
        }
    }

    /// Hands out one scripted transport per connect call.
    struct ScriptedConnector {
        scripts: StdMutex<VecDeque<Vec<Option<std::result::Result<String, ClientError>>>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Transport = ScriptedTransport;

        async fn connect(&self) -> std::result::Result<ScriptedTransport, ClientError> {
            let script = self.scripts.lock().unwrap().pop_front();
            match script {
                Some(script) => Ok(ScriptedTransport {
                    incoming: VecDeque::from(script),
                    sent: Arc::clone(&self.sent),
                }),
                None => Err(ClientError::TransportClosed),
            }
        }
    }

    fn handshake() -> Vec<Option<std::result::Result<String, ClientError>>> {
        vec![
            Some(Ok(r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.into())),
            Some(Ok("40".into())),
        ]
    }

    fn fast_config() -> ClientConfig {
        ClientConfig::new("http://test")
            .unwrap()
            .with_shutdown_timeout(Duration::from_millis(200))
            .with_reconnect(ReconnectPolicy {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                multiplier: 2.0,
                max_attempts: 2,
            })
    }

    fn connector(
        scripts: Vec<Vec<Option<std::result::Result<String, ClientError>>>>,
    ) -> (ScriptedConnector, Arc<StdMutex<Vec<String>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        (
            ScriptedConnector {
                scripts: StdMutex::new(VecDeque::from(scripts)),
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }

    #[tokio::test]
    async fn handshake_sends_namespace_connect_then_reports_connected() {
        let (connector, sent) = connector(vec![handshake()]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert!(channel.is_connected());
        assert_eq!(channel.session_id().await.as_deref(), Some("s1"));
        assert_eq!(sent.lock().unwrap().first().map(String::as_str), Some("40"));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let mut script = handshake();
        script.push(Some(Ok("2".into())));
        script.push(Some(Ok(r#"42["error",{"message":"x"}]"#.into())));
        let (connector, sent) = connector(vec![script]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        let _ = events.recv().await; // error event, proves the ping was processed first
        assert!(sent.lock().unwrap().contains(&"3".to_string()));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn emit_before_connected_is_rejected() {
        let (connector, _sent) = connector(vec![]);
        let (mut channel, _events) = EventChannel::connect(connector, &fast_config());
        let result = channel.emit(ClientEvent::RequestLeaderboard);
        assert!(matches!(result, Err(ClientError::NotConnected)));
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn emit_is_framed_as_socket_io_event() {
        let (connector, sent) = connector(vec![handshake()]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

        channel
            .emit(ClientEvent::JoinGame { token: "T".into() })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(sent
            .lock()
            .unwrap()
            .contains(&r#"42["join_game",{"token":"T"}]"#.to_string()));
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn reconnects_after_drop_and_reports_connected_again() {
        let mut first = handshake();
        first.push(None);
        let (connector, _sent) = connector(vec![first, handshake()]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected {
                reason: None,
                will_reconnect: true
            }
        );
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn gives_up_when_server_stays_unreachable() {
        let (connector, _sent) = connector(vec![]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            ChannelEvent::Disconnected {
                will_reconnect: false,
                ..
            }
        ));
        assert!(events.recv().await.is_none());
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_emits_final_event_and_never_reconnects() {
        let (connector, sent) = connector(vec![handshake(), handshake()]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

        channel.disconnect().await;

        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected {
                reason: Some("client shut down".into()),
                will_reconnect: false
            }
        );
        assert!(events.recv().await.is_none());
        assert!(!channel.is_connected());
        assert!(sent.lock().unwrap().contains(&"41".to_string()));
    }

    #[tokio::test]
    async fn oversized_ping_window_does_not_panic() {
        let script = vec![
            Some(Ok(format!(
                r#"0{{"sid":"s1","upgrades":[],"pingInterval":{max},"pingTimeout":{max}}}"#,
                max = u64::MAX
            ))),
            Some(Ok("40".into())),
            Some(Ok("2".into())),
            Some(Ok(r#"42["player_answered",{"nickname":"bo"}]"#.into())),
        ];
        let (connector, sent) = connector(vec![script]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Event(ServerEvent::PlayerAnswered {
                nickname: "bo".into()
            })
        );
        assert!(sent.lock().unwrap().contains(&"3".to_string()));
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn malformed_packets_are_skipped() {
        let mut script = handshake();
        script.push(Some(Ok("garbage".into())));
        script.push(Some(Ok(r#"42["mystery",{}]"#.into())));
        script.push(Some(Ok(r#"42["player_answered",{"nickname":"bo"}]"#.into())));
        let (connector, _sent) = connector(vec![script]);
        let (mut channel, mut events) = EventChannel::connect(connector, &fast_config());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Event(ServerEvent::PlayerAnswered {
                nickname: "bo".into()
            })
        );
        channel.disconnect().await;
    }
}
