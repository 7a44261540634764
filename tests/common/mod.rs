#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Wahlplakat client integration tests.
//!
//! Provides a channel-backed [`LiveTransport`] whose server side is driven by
//! the test, a scripted [`MockBackend`] for the HTTP API, and recording
//! implementations of [`View`] and [`AudioSink`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use wahlplakat_client::audio::{AudioSink, Cue};
use wahlplakat_client::http::{HttpBackend, Method};
use wahlplakat_client::protocol::{LeaderboardEntry, LobbyPlayer};
use wahlplakat_client::session::{Session, UserProfile};
use wahlplakat_client::view::{AuthTab, Control, ControlState, MessageCategory, Page, StatusLine};
use wahlplakat_client::{ClientConfig, ClientError, Connector, ReconnectPolicy, Transport, View};

// ── LiveTransport ───────────────────────────────────────────────────

/// A transport whose incoming packets are pushed by the test through a
/// [`ServerSide`]. Everything the client sends is recorded in `sent`.
pub struct LiveTransport {
    incoming: mpsc::UnboundedReceiver<Option<String>>,
    sent: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Transport for LiveTransport {
    async fn send(&mut self, packet: String) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push(packet);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ClientError>> {
        match self.incoming.recv().await {
            Some(Some(packet)) => Some(Ok(packet)),
            // `None` pushed by the test, or the server side dropped.
            Some(None) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// The server end of one [`LiveTransport`].
pub struct ServerSide {
    tx: mpsc::UnboundedSender<Option<String>>,
}

impl ServerSide {
    pub fn push(&self, packet: impl Into<String>) {
        let _ = self.tx.send(Some(packet.into()));
    }

    /// Push the Engine.IO open packet and the namespace acknowledgement.
    pub fn handshake(&self) {
        self.push(open_frame());
        self.push("40");
    }

    pub fn event(&self, name: &str, data: Value) {
        self.push(event_frame(name, data));
    }

    /// Close the connection from the server side.
    pub fn drop_connection(&self) {
        let _ = self.tx.send(None);
    }
}

/// Hands out prepared [`LiveTransport`]s, one per connect call.
pub struct LiveConnector {
    pending: StdMutex<VecDeque<LiveTransport>>,
    pub connects: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for LiveConnector {
    type Transport = LiveTransport;

    async fn connect(&self) -> Result<LiveTransport, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.pending
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ClientError::TransportClosed)
    }
}

/// A connector good for `connections` connects, the matching server sides,
/// and the shared log of sent packets.
pub fn live_connector(
    connections: usize,
) -> (LiveConnector, Vec<ServerSide>, Arc<StdMutex<Vec<String>>>) {
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let mut pending = VecDeque::new();
    let mut servers = Vec::new();
    for _ in 0..connections {
        let (tx, incoming) = mpsc::unbounded_channel();
        pending.push_back(LiveTransport {
            incoming,
            sent: Arc::clone(&sent),
        });
        servers.push(ServerSide { tx });
    }
    let connector = LiveConnector {
        pending: StdMutex::new(pending),
        connects: Arc::new(AtomicUsize::new(0)),
    };
    (connector, servers, sent)
}

// ── Frames ──────────────────────────────────────────────────────────

pub fn open_frame() -> String {
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.to_string()
}

/// A Socket.IO event packet as the server sends it.
pub fn event_frame(name: &str, data: Value) -> String {
    format!("42{}", json!([name, data]))
}

/// Sent packets that carry the named event.
pub fn sent_events(sent: &StdMutex<Vec<String>>, name: &str) -> Vec<Value> {
    sent.lock()
        .unwrap()
        .iter()
        .filter_map(|frame| frame.strip_prefix("42"))
        .filter_map(|body| serde_json::from_str::<Vec<Value>>(body).ok())
        .filter(|items| items.first().and_then(Value::as_str) == Some(name))
        .map(|items| items.get(1).cloned().unwrap_or(Value::Null))
        .collect()
}

pub fn join_success(players: Value) -> Value {
    json!({ "players": players })
}

pub fn new_round(round_number: u64, wahlspruch: &str) -> Value {
    json!({ "round_number": round_number, "wahlspruch": wahlspruch })
}

pub fn round_end(correct: &str, results: Value, quelle: Value) -> Value {
    json!({ "correct_partei": correct, "results": results, "quelle": quelle })
}

// ── Config & fixtures ───────────────────────────────────────────────

/// Config with short timeouts and a fast reconnect policy.
pub fn test_config(max_attempts: u32) -> ClientConfig {
    ClientConfig::new("http://game.test")
        .unwrap()
        .with_shutdown_timeout(Duration::from_millis(200))
        .with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_attempts,
        })
}

pub fn ana_session() -> Session {
    Session {
        token: "T".into(),
        profile: UserProfile {
            user_id: 7,
            nickname: "ana".into(),
            points: 0,
        },
    }
}

/// Route client logs to the test output. Set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Wait (up to five seconds) until `cond` holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

// ── MockBackend ─────────────────────────────────────────────────────

type Recorded = (Method, String, Option<Value>);

/// Scripted [`HttpBackend`]. Responses are queued per path; a path without a
/// queued response fails like an unreachable server.
#[derive(Default)]
pub struct MockBackend {
    responses: StdMutex<HashMap<String, VecDeque<Result<Value, ClientError>>>>,
    requests: StdMutex<Vec<Recorded>>,
    gate: Option<Arc<Notify>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request waits for `gate` to be notified before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn respond(self, path: &str, body: Value) -> Self {
        self.queue(path, Ok(body))
    }

    pub fn fail(self, path: &str) -> Self {
        self.queue(path, Err(ClientError::Http("connection refused".into())))
    }

    fn queue(self, path: &str, response: Result<Value, ClientError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|(_, path, _)| path).collect()
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.requests
            .lock()
            .unwrap()
            .push((method, path.to_string(), body));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Err(ClientError::Http(format!("no route for {path}"))))
    }
}

// ── RecordingView ───────────────────────────────────────────────────

/// Everything a [`RecordingView`] was asked to do.
#[derive(Debug, Default)]
pub struct ViewLog {
    pub messages: Vec<(MessageCategory, String)>,
    pub players: Vec<Vec<LobbyPlayer>>,
    pub leaderboards: Vec<Vec<LeaderboardEntry>>,
    pub user: Option<(String, i64)>,
    pub parties: Vec<String>,
    pub controls: Vec<(Control, ControlState)>,
    pub statuses: Vec<StatusLine>,
    pub alerts: Vec<String>,
    pub confirms: Vec<String>,
    pub pages: Vec<Page>,
    pub tabs: Vec<AuthTab>,
    pub prefilled: Vec<String>,
    pub register_cleared: usize,
    pub transcript_cleared: usize,
    pub opened: Vec<String>,
    pub loading: Vec<bool>,
    pub slogans: Vec<(u64, String)>,
}

impl ViewLog {
    /// The most recent state set for `control`.
    pub fn control(&self, control: Control) -> Option<&ControlState> {
        self.controls
            .iter()
            .rev()
            .find(|(c, _)| *c == control)
            .map(|(_, state)| state)
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        self.control(control).is_some_and(|s| s.enabled)
    }

    pub fn has_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|(_, text)| text.contains(needle))
    }

    pub fn last_page(&self) -> Option<Page> {
        self.pages.last().copied()
    }
}

/// A [`View`] that records into a shared [`ViewLog`]. Clones share the log.
#[derive(Clone)]
pub struct RecordingView {
    log: Arc<StdMutex<ViewLog>>,
    confirm_answer: bool,
}

impl RecordingView {
    pub fn new() -> Self {
        Self {
            log: Arc::new(StdMutex::new(ViewLog::default())),
            confirm_answer: true,
        }
    }

    pub fn declining() -> Self {
        Self {
            confirm_answer: false,
            ..Self::new()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, ViewLog> {
        self.log.lock().unwrap()
    }
}

impl View for RecordingView {
    fn append_message(&mut self, category: MessageCategory, text: &str) {
        self.log().messages.push((category, text.to_string()));
    }

    fn render_players(&mut self, players: &[LobbyPlayer]) {
        self.log().players.push(players.to_vec());
    }

    fn render_leaderboard(&mut self, entries: &[LeaderboardEntry]) {
        self.log().leaderboards.push(entries.to_vec());
    }

    fn render_user(&mut self, nickname: &str, points: i64) {
        self.log().user = Some((nickname.to_string(), points));
    }

    fn render_parties(&mut self, parties: &[String]) {
        self.log().parties = parties.to_vec();
    }

    fn set_control(&mut self, control: Control, state: ControlState) {
        self.log().controls.push((control, state));
    }

    fn set_status(&mut self, status: StatusLine) {
        self.log().statuses.push(status);
    }

    fn alert(&mut self, text: &str) {
        self.log().alerts.push(text.to_string());
    }

    fn confirm(&mut self, text: &str) -> bool {
        self.log().confirms.push(text.to_string());
        self.confirm_answer
    }

    fn show_page(&mut self, page: Page) {
        self.log().pages.push(page);
    }

    fn switch_auth_tab(&mut self, tab: AuthTab) {
        self.log().tabs.push(tab);
    }

    fn prefill_login(&mut self, nickname: &str) {
        self.log().prefilled.push(nickname.to_string());
    }

    fn clear_register_form(&mut self) {
        self.log().register_cleared += 1;
    }

    fn clear_transcript(&mut self) {
        self.log().transcript_cleared += 1;
    }

    fn open_external(&mut self, url: &str) {
        self.log().opened.push(url.to_string());
    }

    fn set_loading(&mut self, loading: bool) {
        self.log().loading.push(loading);
    }

    fn render_slogan(&mut self, round_number: u64, slogan: &str) {
        self.log().slogans.push((round_number, slogan.to_string()));
    }
}

// ── RecordingAudio ──────────────────────────────────────────────────

/// An [`AudioSink`] that records played cues. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingAudio {
    played: Arc<StdMutex<Vec<Cue>>>,
}

impl RecordingAudio {
    pub fn played(&self) -> Vec<Cue> {
        self.played.lock().unwrap().clone()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.played().iter().filter(|c| **c == cue).count()
    }
}

impl AudioSink for RecordingAudio {
    type Clip = Cue;

    fn load(&mut self, cue: Cue, _path: &str) -> wahlplakat_client::Result<Cue> {
        Ok(cue)
    }

    fn play(&mut self, clip: Cue, _volume: f32) -> wahlplakat_client::Result<()> {
        self.played.lock().unwrap().push(clip);
        Ok(())
    }
}
