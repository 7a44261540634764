//! Wire-compatible protocol types for the Wahlplakat game server.
//!
//! Realtime events are modelled as adjacently tagged enums
//! (`{"event": "...", "data": {...}}`). The Socket.IO codec in
//! [`engineio`](crate::engineio) converts between that shape and the
//! `["event", data]` arrays that travel on the wire.
//!
//! HTTP request and response bodies live at the bottom of this module. Every
//! optional response field is `#[serde(default)]` because the server omits
//! keys rather than sending `null` on most failure paths.

use serde::{Deserialize, Serialize};

// ── Shared records ──────────────────────────────────────────────────

/// A player currently in the lobby, as pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub nickname: String,
    pub points: i64,
    #[serde(default)]
    pub answered: bool,
    #[serde(default = "default_true")]
    pub can_answer: bool,
}

/// One line of the round result table sent with `round_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub nickname: String,
    /// `false` when the player joined while the round was already running.
    #[serde(default = "default_true")]
    pub could_answer: bool,
    /// The party the player picked, if any.
    #[serde(default)]
    pub answered: Option<String>,
    /// `None` means no answer was submitted.
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default)]
    pub points_earned: i64,
    pub total_points: i64,
}

/// A row of the global leaderboard, ordered by `rank`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub nickname: String,
    pub points: i64,
}

/// Why a player left the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaveReason {
    /// The player asked to leave.
    #[default]
    Request,
    /// The player's connection dropped.
    Disconnect,
    /// Any other reason relayed by the server.
    #[serde(other)]
    Other,
}

fn default_true() -> bool {
    true
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `join_success` server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSuccessPayload {
    pub players: Vec<LobbyPlayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_nickname: Option<String>,
    /// Whether a round was already running when we joined.
    #[serde(default)]
    pub round_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_number: Option<u64>,
}

/// Payload for the `round_end` server event.
/// Boxed in `ServerEvent` to reduce enum size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEndPayload {
    pub correct_partei: String,
    pub results: Vec<PlayerResult>,
    /// Attribution for the slogan. Missing, `null` and `""` all mean "none".
    #[serde(default)]
    pub quelle: Option<String>,
}

// ── Events ──────────────────────────────────────────────────────────

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Enter the lobby with the session token. Sent after every (re)connect.
    JoinGame { token: String },
    /// Answer the current round.
    SubmitAnswer { token: String, partei: String },
    /// Leave the lobby.
    LeaveGame { token: String, reason: LeaveReason },
    /// Ask for a leaderboard snapshot. The server may not answer.
    RequestLeaderboard,
}

impl ClientEvent {
    /// The Socket.IO event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "join_game",
            Self::SubmitAnswer { .. } => "submit_answer",
            Self::LeaveGame { .. } => "leave_game",
            Self::RequestLeaderboard => "request_leaderboard",
        }
    }
}

/// Events emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Greeting sent right after the socket connects.
    Connected { message: String },
    /// We are in the lobby.
    JoinSuccess(JoinSuccessPayload),
    /// A new round started.
    NewRound {
        round_number: u64,
        wahlspruch: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wahlspruch_id: Option<i64>,
    },
    /// Another player answered.
    PlayerAnswered { nickname: String },
    /// Our answer was registered.
    AnswerAccepted { partei: String },
    /// The round is over (boxed to reduce enum size).
    RoundEnd(Box<RoundEndPayload>),
    /// Another player entered the lobby.
    PlayerJoined {
        nickname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        points: Option<i64>,
    },
    /// A player left the lobby.
    PlayerLeft {
        nickname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<LeaveReason>,
    },
    /// Full replacement of the lobby player list.
    PlayerListUpdate { players: Vec<LobbyPlayer> },
    /// Full replacement of the leaderboard.
    LeaderboardUpdate { leaderboard: Vec<LeaderboardEntry> },
    /// The server rejected something we did.
    Error { message: String },
}

impl ServerEvent {
    /// The Socket.IO event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::JoinSuccess(_) => "join_success",
            Self::NewRound { .. } => "new_round",
            Self::PlayerAnswered { .. } => "player_answered",
            Self::AnswerAccepted { .. } => "answer_accepted",
            Self::RoundEnd(_) => "round_end",
            Self::PlayerJoined { .. } => "player_joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::PlayerListUpdate { .. } => "player_list_update",
            Self::LeaderboardUpdate { .. } => "leaderboard_update",
            Self::Error { .. } => "error",
        }
    }
}

// ── HTTP bodies ─────────────────────────────────────────────────────

/// Body for `/api/auth/login` and `/api/auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub nickname: String,
    pub password: String,
}

/// Body for `/api/auth/check-username`.
#[derive(Debug, Clone, Serialize)]
pub struct NicknameQuery {
    pub nickname: String,
}

/// Body for `/api/auth/validate` and `/api/auth/logout`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenBody {
    pub token: String,
}

/// Response of `/api/auth/login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub last_login_time: Option<String>,
    #[serde(default)]
    pub last_login_ip: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Generic `{success, message?}` response (register, logout).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `/api/auth/check-username`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `/api/auth/validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
}

/// Response of `/api/game/parteien`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PartiesResponse {
    pub success: bool,
    #[serde(default)]
    pub parteien: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `/api/game/leaderboard`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub message: Option<String>,
}
