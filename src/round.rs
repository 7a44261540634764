//! Per-round client state machine.
//!
//! [`RoundMachine`] is a reducer: it takes one [`Input`] (a channel
//! connect/disconnect or a typed server event) or one user action, updates
//! its state, and returns the [`Effect`]s the caller must carry out in
//! order. It performs no I/O, which keeps every transition testable on
//! plain values.
//!
//! ```text
//! Disconnected ──Connected──▶ Connecting ──join_success──▶ LobbyIdle
//!                                                            │
//!                  ┌──────────────new_round──────────────────┘
//!                  ▼
//!             RoundActive ──round_end──▶ RoundEnded ──new_round──▶ RoundActive
//! ```
//!
//! A `Disconnected` input from any phase returns to `Disconnected`; the
//! session is kept and the next `Connected` re-joins the lobby.

use crate::audio::Cue;
use crate::protocol::{
    ClientEvent, JoinSuccessPayload, LeaderboardEntry, LeaveReason, LobbyPlayer, PlayerResult,
    RoundEndPayload, ServerEvent,
};
use crate::session::Session;
use crate::view::{self, Control, MessageCategory, Page};

/// Seconds the server gives for an answer.
pub const ANSWER_WINDOW_SECS: u64 = 15;

/// Seconds between `round_end` and the next `new_round`.
pub const ROUND_BREAK_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    LobbyIdle,
    RoundActive,
    RoundEnded,
}

/// What drives the machine besides user actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Connected,
    Disconnected { reason: Option<String> },
    Server(ServerEvent),
}

/// Work the caller performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Emit(ClientEvent),
    Play(Cue),
    Notice(MessageCategory, String),
    SetControl(Control, bool),
    RenderPlayers(Vec<LobbyPlayer>),
    RenderLeaderboard(Vec<LeaderboardEntry>),
    RenderSlogan { round_number: u64, slogan: String },
    /// The local player's new total, to display and persist.
    UpdatePoints(i64),
    OpenExternal(String),
    ShowText(String),
    CloseChannel,
    ClearTranscript,
    ShowPage(Page),
}

/// A user action the machine refused. The `Display` text is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("You are not logged in.")]
    NoSession,
    #[error("There is no round in progress.")]
    NoActiveRound,
    #[error("You have already answered!")]
    AlreadyAnswered,
    #[error("You joined during this round. Wait for the next one.")]
    CannotAnswer,
    #[error("Your answer has already been sent.")]
    AlreadySubmitted,
    #[error("Please choose a party!")]
    NoSelection,
    #[error("Unknown party: {0}")]
    UnknownParty(String),
    #[error("No source available for this slogan.")]
    NoSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Active,
    Ended,
}

/// The round the client currently knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub round_number: u64,
    pub slogan: String,
    pub phase: RoundPhase,
    /// Set only by `answer_accepted`.
    pub has_answered_locally: bool,
    pub can_answer_locally: bool,
    /// Only meaningful once the round has ended.
    pub source: Option<String>,
    pub last_results: Option<Vec<PlayerResult>>,
}

impl Round {
    fn new(round_number: u64, slogan: String, can_answer: bool) -> Self {
        Self {
            round_number,
            slogan,
            phase: RoundPhase::Active,
            has_answered_locally: false,
            can_answer_locally: can_answer,
            source: None,
            last_results: None,
        }
    }
}

/// `quelle` counts as a source only when it has visible content.
fn normalize_source(quelle: Option<String>) -> Option<String> {
    quelle.filter(|q| !q.trim().is_empty())
}

/// Client-side game state.
#[derive(Debug, Clone)]
pub struct RoundMachine {
    phase: Phase,
    session: Option<Session>,
    /// Server-confirmed nickname, falling back to the session's.
    nickname: Option<String>,
    known_parties: Vec<String>,
    round: Option<Round>,
    /// Latched by a submit until the next `new_round`.
    submitted: bool,
    /// Round that was already running when `join_success` arrived.
    joined_during: Option<u64>,
    players: Vec<LobbyPlayer>,
    leaderboard: Vec<LeaderboardEntry>,
}

impl RoundMachine {
    pub fn new(session: Option<Session>, known_parties: Vec<String>) -> Self {
        let nickname = session.as_ref().map(|s| s.profile.nickname.clone());
        Self {
            phase: Phase::Disconnected,
            session,
            nickname,
            known_parties,
            round: None,
            submitted: false,
            joined_during: None,
            players: Vec::new(),
            leaderboard: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    pub fn players(&self) -> &[LobbyPlayer] {
        &self.players
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn known_parties(&self) -> &[String] {
        &self.known_parties
    }

    /// Whether a submit is latched for the current round.
    pub fn has_submitted(&self) -> bool {
        self.submitted
    }

    /// Release the submit latch after the emit could not be delivered.
    pub fn release_submission(&mut self) {
        self.submitted = false;
    }

    fn is_online(&self) -> bool {
        self.phase != Phase::Disconnected
    }

    fn token(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.token.clone())
    }

    // ── Inputs ──────────────────────────────────────────────────────

    /// Apply one input and return the resulting effects in order.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Connected => self.on_connected(),
            Input::Disconnected { reason } => self.on_disconnected(reason),
            Input::Server(event) => self.on_server_event(event),
        }
    }

    fn on_connected(&mut self) -> Vec<Effect> {
        let Some(token) = self.token() else {
            tracing::warn!("channel connected without a session; not joining");
            self.phase = Phase::Disconnected;
            return Vec::new();
        };
        tracing::debug!(from = ?self.phase, "channel connected, joining lobby");
        self.phase = Phase::Connecting;
        vec![Effect::Emit(ClientEvent::JoinGame { token })]
    }

    fn on_disconnected(&mut self, reason: Option<String>) -> Vec<Effect> {
        if self.phase == Phase::Disconnected {
            tracing::debug!(?reason, "already disconnected");
            return Vec::new();
        }
        tracing::info!(?reason, from = ?self.phase, "channel lost");
        self.phase = Phase::Disconnected;
        vec![
            Effect::Notice(
                MessageCategory::Error,
                "❌ Connection to server lost".into(),
            ),
            Effect::SetControl(Control::Answer, false),
            Effect::SetControl(Control::Source, false),
        ]
    }

    fn on_server_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        if self.phase == Phase::Disconnected {
            tracing::warn!(event = event.name(), "event while disconnected, ignoring");
            return Vec::new();
        }
        match event {
            ServerEvent::Connected { message } => {
                tracing::debug!(%message, "server greeting");
                vec![Effect::Notice(
                    MessageCategory::Success,
                    "✅ Connected! Joining lobby...".into(),
                )]
            }
            ServerEvent::JoinSuccess(payload) => self.on_join_success(payload),
            ServerEvent::NewRound {
                round_number,
                wahlspruch,
                ..
            } => self.on_new_round(round_number, wahlspruch),
            ServerEvent::PlayerAnswered { nickname } => vec![Effect::Notice(
                MessageCategory::Info,
                format!("✓ {nickname} answered"),
            )],
            ServerEvent::AnswerAccepted { partei } => self.on_answer_accepted(partei),
            ServerEvent::RoundEnd(payload) => self.on_round_end(*payload),
            ServerEvent::PlayerJoined { nickname, .. } => vec![
                Effect::Notice(MessageCategory::Warning, format!("👋 {nickname} joined")),
                Effect::Play(Cue::Join),
            ],
            ServerEvent::PlayerLeft { nickname, reason } => {
                let mut text = format!("👋 {nickname} left the lobby");
                if reason == Some(LeaveReason::Disconnect) {
                    text.push_str(" (connection lost)");
                }
                vec![
                    Effect::Notice(MessageCategory::Warning, text),
                    Effect::Play(Cue::Leave),
                ]
            }
            ServerEvent::PlayerListUpdate { players } => {
                self.players = players;
                vec![Effect::RenderPlayers(self.players.clone())]
            }
            ServerEvent::LeaderboardUpdate { leaderboard } => {
                self.leaderboard = leaderboard;
                vec![Effect::RenderLeaderboard(self.leaderboard.clone())]
            }
            ServerEvent::Error { message } => {
                tracing::warn!(%message, "server error");
                vec![Effect::Notice(
                    MessageCategory::Error,
                    format!("❌ Error: {message}"),
                )]
            }
        }
    }

    fn on_join_success(&mut self, payload: JoinSuccessPayload) -> Vec<Effect> {
        if self.phase != Phase::Connecting {
            tracing::warn!(phase = ?self.phase, "join_success outside of connecting");
        }
        self.phase = Phase::LobbyIdle;
        if let Some(nickname) = payload.your_nickname {
            self.nickname = Some(nickname);
        }
        self.joined_during = match (payload.round_active, payload.round_number) {
            (true, Some(n)) => Some(n),
            _ => None,
        };
        self.players = payload.players;

        vec![
            Effect::Notice(
                MessageCategory::Success,
                "✅ Joined the lobby!".into(),
            ),
            Effect::RenderPlayers(self.players.clone()),
            Effect::Emit(ClientEvent::RequestLeaderboard),
        ]
    }

    fn on_new_round(&mut self, round_number: u64, slogan: String) -> Vec<Effect> {
        if self.phase == Phase::Connecting {
            tracing::warn!(round_number, "new_round before join_success, ignoring");
            return Vec::new();
        }

        if let Some(current) = &self.round {
            if current.round_number == round_number && current.phase == RoundPhase::Active {
                if self.phase == Phase::RoundActive {
                    tracing::debug!(round_number, "duplicate new_round ignored");
                    return Vec::new();
                }
                // Re-sent after a reconnect: keep what we know about this round.
                return self.resume_round(round_number);
            }
            if round_number <= current.round_number {
                tracing::warn!(
                    round_number,
                    previous = current.round_number,
                    "round number did not increase; accepting"
                );
            }
        }

        let joined_mid_round = self.joined_during.take() == Some(round_number);
        self.round = Some(Round::new(round_number, slogan.clone(), !joined_mid_round));
        self.submitted = false;
        self.phase = Phase::RoundActive;

        let mut effects = vec![
            Effect::SetControl(Control::Answer, !joined_mid_round),
            Effect::SetControl(Control::Source, false),
            Effect::RenderSlogan {
                round_number,
                slogan,
            },
        ];
        if joined_mid_round {
            effects.push(Effect::Notice(
                MessageCategory::Warning,
                "⊘ You joined during this round. Wait for the next one.".into(),
            ));
        } else {
            effects.push(Effect::Notice(
                MessageCategory::Info,
                format!("⏱️ {ANSWER_WINDOW_SECS} seconds to answer!"),
            ));
        }
        effects
    }

    fn resume_round(&mut self, round_number: u64) -> Vec<Effect> {
        // The server re-adds a rejoining player as a mid-round joiner.
        let rejoined_mid_round = self.joined_during.take() == Some(round_number);
        self.phase = Phase::RoundActive;
        let mut locked_out = false;
        if let Some(round) = self.round.as_mut() {
            if rejoined_mid_round && round.can_answer_locally && !round.has_answered_locally {
                round.can_answer_locally = false;
                locked_out = true;
            }
        }
        let open = self
            .round
            .as_ref()
            .is_some_and(|r| r.can_answer_locally && !r.has_answered_locally)
            && !self.submitted;
        tracing::debug!(open, rejoined_mid_round, "resuming round after reconnect");
        let mut effects = vec![
            Effect::SetControl(Control::Answer, open),
            Effect::SetControl(Control::Source, false),
        ];
        if locked_out {
            effects.push(Effect::Notice(
                MessageCategory::Warning,
                "⊘ You joined during this round. Wait for the next one.".into(),
            ));
        }
        effects
    }

    fn on_answer_accepted(&mut self, partei: String) -> Vec<Effect> {
        if self.phase != Phase::RoundActive {
            tracing::warn!(phase = ?self.phase, %partei, "answer_accepted outside a round, ignoring");
            return Vec::new();
        }
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };
        if !round.can_answer_locally {
            tracing::warn!(%partei, "answer_accepted for a player who cannot answer, ignoring");
            return Vec::new();
        }
        if round.has_answered_locally {
            tracing::debug!(%partei, "duplicate answer_accepted ignored");
            return Vec::new();
        }
        round.has_answered_locally = true;
        vec![
            Effect::SetControl(Control::Answer, false),
            Effect::Notice(
                MessageCategory::Success,
                format!("✅ Your answer was registered: {partei}"),
            ),
            Effect::Play(Cue::Lock),
        ]
    }

    fn on_round_end(&mut self, payload: RoundEndPayload) -> Vec<Effect> {
        match self.phase {
            Phase::RoundActive | Phase::LobbyIdle => {}
            Phase::RoundEnded => {
                tracing::debug!("duplicate round_end ignored");
                return Vec::new();
            }
            phase => {
                tracing::warn!(?phase, "round_end before joining, ignoring");
                return Vec::new();
            }
        }

        let late_join = self.phase == Phase::LobbyIdle;
        if late_join {
            // The round was running before we (re)joined. Keep the local round
            // only if it is the one being closed.
            let number = self.joined_during.take();
            let resumed = self.round.as_ref().is_some_and(|r| {
                r.phase == RoundPhase::Active && number.map_or(true, |n| n == r.round_number)
            });
            if !resumed {
                self.round = Some(Round::new(number.unwrap_or_default(), String::new(), false));
            }
        }
        self.phase = Phase::RoundEnded;

        let RoundEndPayload {
            correct_partei,
            results,
            quelle,
        } = payload;
        let source = normalize_source(quelle);

        let mut effects: Vec<Effect> = view::round_end_lines(&correct_partei)
            .into_iter()
            .map(|(category, text)| Effect::Notice(category, text))
            .collect();

        let mine = self
            .nickname
            .as_deref()
            .and_then(|nick| results.iter().find(|r| r.nickname == nick));

        if let Some(result) = mine {
            match (result.could_answer, result.correct) {
                (true, Some(true)) => effects.push(Effect::Play(Cue::Correct)),
                (true, Some(false)) => effects.push(Effect::Play(Cue::Incorrect)),
                _ => {}
            }
        }

        effects.extend(
            results
                .iter()
                .map(view::result_line)
                .map(|(category, text)| Effect::Notice(category, text)),
        );
        effects.push(Effect::Notice(
            MessageCategory::Info,
            format!("⏳ Next round in {ROUND_BREAK_SECS} seconds..."),
        ));

        if let Some(total) = mine.map(|r| r.total_points) {
            if let Some(session) = self.session.as_mut() {
                session.profile.points = total;
            }
            effects.push(Effect::UpdatePoints(total));
        }

        effects.push(Effect::SetControl(Control::Answer, false));
        effects.push(Effect::SetControl(Control::Source, source.is_some()));

        if let Some(round) = self.round.as_mut() {
            round.phase = RoundPhase::Ended;
            round.source = source;
            round.last_results = Some(results);
        }
        effects
    }

    // ── User actions ────────────────────────────────────────────────

    /// Submit `partei` for the current round.
    ///
    /// # Errors
    ///
    /// The reason the answer cannot be sent now. Nothing changes on error.
    pub fn submit_answer(&mut self, partei: &str) -> Result<Vec<Effect>, ActionError> {
        let token = self.token().ok_or(ActionError::NoSession)?;
        let round = match (&self.round, self.phase) {
            (Some(round), Phase::RoundActive) => round,
            _ => return Err(ActionError::NoActiveRound),
        };
        if round.has_answered_locally {
            return Err(ActionError::AlreadyAnswered);
        }
        if !round.can_answer_locally {
            return Err(ActionError::CannotAnswer);
        }
        if self.submitted {
            return Err(ActionError::AlreadySubmitted);
        }
        let partei = partei.trim();
        if partei.is_empty() {
            return Err(ActionError::NoSelection);
        }
        if !self.known_parties.iter().any(|p| p == partei) {
            return Err(ActionError::UnknownParty(partei.to_string()));
        }

        self.submitted = true;
        tracing::debug!(round = round.round_number, %partei, "submitting answer");
        Ok(vec![Effect::Emit(ClientEvent::SubmitAnswer {
            token,
            partei: partei.to_string(),
        })])
    }

    /// Reveal the source of the round that just ended.
    ///
    /// # Errors
    ///
    /// [`ActionError::NoSource`] unless the last round has ended with a source.
    pub fn show_source(&self) -> Result<Vec<Effect>, ActionError> {
        let source = self
            .round
            .as_ref()
            .filter(|r| r.phase == RoundPhase::Ended)
            .and_then(|r| r.source.as_deref())
            .ok_or(ActionError::NoSource)?;

        if source.starts_with("http") {
            Ok(vec![Effect::OpenExternal(source.to_string())])
        } else {
            Ok(vec![Effect::ShowText(format!("Source:\n\n{source}"))])
        }
    }

    /// Leave the lobby after the user confirmed. The session is kept.
    pub fn leave_game(&mut self, confirmed: bool) -> Vec<Effect> {
        if !confirmed {
            return Vec::new();
        }
        let mut effects = vec![Effect::Notice(
            MessageCategory::Warning,
            "👋 Leaving game...".into(),
        )];
        effects.extend(self.leave_emit());
        effects.extend([
            Effect::CloseChannel,
            Effect::ClearTranscript,
            Effect::RenderPlayers(Vec::new()),
            Effect::RenderLeaderboard(Vec::new()),
            Effect::SetControl(Control::Answer, false),
            Effect::SetControl(Control::Source, false),
            Effect::ShowPage(Page::Auth),
        ]);

        self.phase = Phase::Disconnected;
        self.round = None;
        self.submitted = false;
        self.joined_during = None;
        self.players.clear();
        self.leaderboard.clear();
        effects
    }

    /// Best-effort goodbye before the window goes away.
    pub fn before_window_close(&mut self) -> Vec<Effect> {
        self.leave_emit().into_iter().collect()
    }

    fn leave_emit(&self) -> Option<Effect> {
        if !self.is_online() {
            return None;
        }
        self.token().map(|token| {
            Effect::Emit(ClientEvent::LeaveGame {
                token,
                reason: LeaveReason::Request,
            })
        })
    }
}

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
    use crate::session::UserProfile;

    fn machine() -> RoundMachine {
        let session = Session {
            token: "T".into(),
            profile: UserProfile {
                user_id: 7,
                nickname: "ana".into(),
                points: 0,
            },
        };
        RoundMachine::new(Some(session), vec!["A".into(), "B".into()])
    }

    fn joined() -> RoundMachine {
        let mut m = machine();
        m.handle(Input::Connected);
        m.handle(Input::Server(ServerEvent::JoinSuccess(JoinSuccessPayload {
            players: Vec::new(),
            your_nickname: None,
            round_active: false,
            round_number: None,
        })));
        m
    }

    fn new_round(n: u64) -> Input {
        Input::Server(ServerEvent::NewRound {
            round_number: n,
            wahlspruch: "S".into(),
            wahlspruch_id: None,
        })
    }

    #[test]
    fn normalize_source_drops_blank_values() {
        assert_eq!(normalize_source(None), None);
        assert_eq!(normalize_source(Some(String::new())), None);
        assert_eq!(normalize_source(Some("  ".into())), None);
        assert_eq!(
            normalize_source(Some("Book, p.42".into())),
            Some("Book, p.42".into())
        );
    }

    #[test]
    fn connected_without_session_stays_disconnected() {
        let mut m = RoundMachine::new(None, Vec::new());
        assert!(m.handle(Input::Connected).is_empty());
        assert_eq!(m.phase(), Phase::Disconnected);
    }

    #[test]
    fn join_success_requests_leaderboard() {
        let mut m = machine();
        assert_eq!(
            m.handle(Input::Connected),
            vec![Effect::Emit(ClientEvent::JoinGame { token: "T".into() })]
        );
        let effects = m.handle(Input::Server(ServerEvent::JoinSuccess(JoinSuccessPayload {
            players: Vec::new(),
            your_nickname: None,
            round_active: false,
            round_number: None,
        })));
        assert_eq!(m.phase(), Phase::LobbyIdle);
        assert!(effects.contains(&Effect::Emit(ClientEvent::RequestLeaderboard)));
    }

    #[test]
    fn submit_is_latched_until_next_round() {
        let mut m = joined();
        m.handle(new_round(1));
        assert!(m.submit_answer("A").is_ok());
        assert_eq!(m.submit_answer("B"), Err(ActionError::AlreadySubmitted));

        m.handle(new_round(2));
        assert!(m.submit_answer("B").is_ok());
    }

    #[test]
    fn released_submission_can_be_retried() {
        let mut m = joined();
        m.handle(new_round(1));
        m.submit_answer("A").unwrap();
        m.release_submission();
        assert!(m.submit_answer("A").is_ok());
    }

    #[test]
    fn submit_rejects_empty_and_unknown_parties() {
        let mut m = joined();
        m.handle(new_round(1));
        assert_eq!(m.submit_answer("  "), Err(ActionError::NoSelection));
        assert_eq!(
            m.submit_answer("Z"),
            Err(ActionError::UnknownParty("Z".into()))
        );
        assert!(!m.has_submitted());
    }

    #[test]
    fn submit_outside_round_is_rejected() {
        let mut m = joined();
        assert_eq!(m.submit_answer("A"), Err(ActionError::NoActiveRound));
    }

    #[test]
    fn duplicate_new_round_keeps_latch() {
        let mut m = joined();
        m.handle(new_round(4));
        m.submit_answer("A").unwrap();
        assert!(m.handle(new_round(4)).is_empty());
        assert!(m.has_submitted());
    }

    #[test]
    fn answer_accepted_outside_round_is_ignored() {
        let mut m = joined();
        let effects = m.handle(Input::Server(ServerEvent::AnswerAccepted {
            partei: "A".into(),
        }));
        assert!(effects.is_empty());
        assert!(m.round().is_none());
    }

    #[test]
    fn show_source_needs_an_ended_round() {
        let mut m = joined();
        m.handle(new_round(1));
        assert_eq!(m.show_source(), Err(ActionError::NoSource));
    }

    #[test]
    fn events_while_disconnected_are_ignored() {
        let mut m = machine();
        assert!(m.handle(new_round(1)).is_empty());
        assert_eq!(m.phase(), Phase::Disconnected);
    }

    #[test]
    fn leave_without_confirmation_does_nothing() {
        let mut m = joined();
        assert!(m.leave_game(false).is_empty());
        assert_eq!(m.phase(), Phase::LobbyIdle);
    }

    #[test]
    fn window_close_only_emits_when_online() {
        let mut m = machine();
        assert!(m.before_window_close().is_empty());
        let mut m = joined();
        assert_eq!(
            m.before_window_close(),
            vec![Effect::Emit(ClientEvent::LeaveGame {
                token: "T".into(),
                reason: LeaveReason::Request
            })]
        );
    }
}
