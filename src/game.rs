//! Runs one game session.
//!
//! [`GameSession::run`] is the only place where round state changes. It
//! takes channel events and user actions one at a time, feeds them through
//! the [`RoundMachine`], and applies the resulting effects in order before
//! looking at the next item. User actions arrive through a [`GameControls`]
//! handle so any task (a UI thread, a stdin reader) can drive the game.

use tokio::sync::mpsc;

use crate::audio::{AudioSink, CuePlayer};
use crate::channel::{ChannelEvent, EventChannel};
use crate::error::ClientError;
use crate::protocol::ClientEvent;
use crate::round::{Effect, Input, RoundMachine};
use crate::session::{KeyValueStore, SessionStore};
use crate::view::{Control, ControlState, MessageCategory, View};

/// Confirmation text for leaving the game.
pub const LEAVE_PROMPT: &str = "Do you really want to leave the game?";

/// A user action on the game page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SubmitAnswer(String),
    ShowSource,
    Leave,
    /// The window is about to close.
    Close,
}

/// Why [`GameSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameExit {
    /// The user left the game.
    Left,
    /// The window closed.
    Closed,
    /// The channel gave up reconnecting.
    ConnectionLost,
}

/// Cloneable sender for [`UserAction`]s.
#[derive(Debug, Clone)]
pub struct GameControls {
    tx: mpsc::UnboundedSender<UserAction>,
}

impl GameControls {
    /// Create a controls handle and the receiver to pass to the session.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UserAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, action: UserAction) -> bool {
        self.tx.send(action).is_ok()
    }

    /// Returns `false` once the session has ended.
    pub fn submit_answer(&self, partei: impl Into<String>) -> bool {
        self.send(UserAction::SubmitAnswer(partei.into()))
    }

    pub fn show_source(&self) -> bool {
        self.send(UserAction::ShowSource)
    }

    pub fn leave(&self) -> bool {
        self.send(UserAction::Leave)
    }

    pub fn close(&self) -> bool {
        self.send(UserAction::Close)
    }
}

/// One connected game, from lobby join until leave or connection loss.
pub struct GameSession<'a, V: View + ?Sized, A: AudioSink, S> {
    machine: RoundMachine,
    channel: EventChannel,
    events: mpsc::Receiver<ChannelEvent>,
    actions: mpsc::UnboundedReceiver<UserAction>,
    view: &'a mut V,
    audio: &'a mut CuePlayer<A>,
    sessions: SessionStore<S>,
}

impl<'a, V, A, S> GameSession<'a, V, A, S>
where
    V: View + ?Sized,
    A: AudioSink,
    S: KeyValueStore,
{
    pub fn new(
        machine: RoundMachine,
        (channel, events): (EventChannel, mpsc::Receiver<ChannelEvent>),
        actions: mpsc::UnboundedReceiver<UserAction>,
        view: &'a mut V,
        audio: &'a mut CuePlayer<A>,
        sessions: SessionStore<S>,
    ) -> Self {
        Self {
            machine,
            channel,
            events,
            actions,
            view,
            audio,
            sessions,
        }
    }

    pub fn machine(&self) -> &RoundMachine {
        &self.machine
    }

    /// Process events and actions until the game ends.
    pub async fn run(mut self) -> GameExit {
        self.view.append_message(MessageCategory::Info, "🔌 Connecting to server...");
        self.view.set_control(Control::Answer, ControlState::disabled(Control::Answer));
        self.view.set_control(Control::Source, ControlState::disabled(Control::Source));

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("event channel closed");
                        return self.connection_lost().await;
                    };
                    if let Some(exit) = self.on_channel_event(event).await {
                        return exit;
                    }
                }

                Some(action) = self.actions.recv() => {
                    if let Some(exit) = self.on_action(action).await {
                        return exit;
                    }
                }
            }
        }
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) -> Option<GameExit> {
        let input = match event {
            ChannelEvent::Connected => Input::Connected,
            ChannelEvent::Event(event) => Input::Server(event),
            ChannelEvent::Disconnected {
                reason,
                will_reconnect,
            } => {
                let effects = self.machine.handle(Input::Disconnected { reason });
                self.apply(effects).await;
                if will_reconnect {
                    return None;
                }
                return Some(self.connection_lost().await);
            }
        };
        let effects = self.machine.handle(input);
        self.apply(effects).await;
        None
    }

    async fn on_action(&mut self, action: UserAction) -> Option<GameExit> {
        match action {
            UserAction::SubmitAnswer(partei) => match self.machine.submit_answer(&partei) {
                Ok(effects) => self.apply(effects).await,
                Err(e) => self.view.alert(&e.to_string()),
            },
            UserAction::ShowSource => match self.machine.show_source() {
                Ok(effects) => self.apply(effects).await,
                Err(e) => self.view.alert(&e.to_string()),
            },
            UserAction::Leave => {
                let confirmed = self.view.confirm(LEAVE_PROMPT);
                let effects = self.machine.leave_game(confirmed);
                if effects.is_empty() {
                    return None;
                }
                self.apply(effects).await;
                return Some(GameExit::Left);
            }
            UserAction::Close => {
                let effects = self.machine.before_window_close();
                self.apply(effects).await;
                self.channel.disconnect().await;
                return Some(GameExit::Closed);
            }
        }
        None
    }

    async fn connection_lost(&mut self) -> GameExit {
        self.channel.disconnect().await;
        self.view.alert("Lost connection to the game server.");
        GameExit::ConnectionLost
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.apply_one(effect).await;
        }
    }

    async fn apply_one(&mut self, effect: Effect) {
        match effect {
            Effect::Emit(event) => self.emit(event),
            Effect::Play(cue) => self.audio.play(cue),
            Effect::Notice(category, text) => self.view.append_message(category, &text),
            Effect::SetControl(control, enabled) => {
                let state = if enabled {
                    ControlState::enabled(control)
                } else {
                    ControlState::disabled(control)
                };
                self.view.set_control(control, state);
            }
            Effect::RenderPlayers(players) => self.view.render_players(&players),
            Effect::RenderLeaderboard(entries) => self.view.render_leaderboard(&entries),
            Effect::RenderSlogan {
                round_number,
                slogan,
            } => self.view.render_slogan(round_number, &slogan),
            Effect::UpdatePoints(points) => {
                self.sessions.update_points(points);
                if let Some(session) = self.machine.session() {
                    self.view.render_user(&session.profile.nickname, points);
                }
            }
            Effect::OpenExternal(url) => self.view.open_external(&url),
            Effect::ShowText(text) => self.view.alert(&text),
            Effect::CloseChannel => self.channel.disconnect().await,
            Effect::ClearTranscript => self.view.clear_transcript(),
            Effect::ShowPage(page) => self.view.show_page(page),
        }
    }

    fn emit(&mut self, event: ClientEvent) {
        let name = event.name();
        match self.channel.emit(event) {
            Ok(()) => tracing::debug!(event = name, "emitted"),
            Err(ClientError::NotConnected) if name == "submit_answer" => {
                tracing::warn!("answer not sent, channel is down");
                self.machine.release_submission();
                self.view
                    .alert("Not connected. Your answer was not sent, please try again.");
            }
            Err(e) => tracing::warn!(event = name, "emit failed: {e}"),
        }
    }
}

impl<V: View + ?Sized, A: AudioSink, S> std::fmt::Debug for GameSession<'_, V, A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("phase", &self.machine.phase())
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
