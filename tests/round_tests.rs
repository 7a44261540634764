#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! State machine tests: every transition is driven with plain inputs and
//! checked through the returned effects.

mod common;

use serde_json::json;

use wahlplakat_client::audio::Cue;
use wahlplakat_client::protocol::{
    ClientEvent, JoinSuccessPayload, LeaveReason, LobbyPlayer, PlayerResult, RoundEndPayload,
    ServerEvent,
};
use wahlplakat_client::round::RoundPhase;
use wahlplakat_client::view::{Control, MessageCategory, Page};
use wahlplakat_client::{ActionError, Effect, Input, Phase, RoundMachine};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn machine() -> RoundMachine {
    RoundMachine::new(
        Some(common::ana_session()),
        vec!["A".into(), "B".into(), "SPD".into()],
    )
}

fn server(event: ServerEvent) -> Input {
    Input::Server(event)
}

fn join(round_active: bool, round_number: Option<u64>) -> Input {
    server(ServerEvent::JoinSuccess(JoinSuccessPayload {
        players: Vec::new(),
        your_nickname: None,
        round_active,
        round_number,
    }))
}

fn new_round(round_number: u64, slogan: &str) -> Input {
    server(ServerEvent::NewRound {
        round_number,
        wahlspruch: slogan.into(),
        wahlspruch_id: None,
    })
}

fn accepted(partei: &str) -> Input {
    server(ServerEvent::AnswerAccepted {
        partei: partei.into(),
    })
}

fn result(nickname: &str, could_answer: bool, correct: Option<bool>, total: i64) -> PlayerResult {
    PlayerResult {
        nickname: nickname.into(),
        could_answer,
        answered: correct.map(|_| "A".to_string()),
        correct,
        points_earned: i64::from(correct == Some(true)),
        total_points: total,
    }
}

fn round_end(correct: &str, results: Vec<PlayerResult>, quelle: Option<&str>) -> Input {
    server(ServerEvent::RoundEnd(Box::new(RoundEndPayload {
        correct_partei: correct.into(),
        results,
        quelle: quelle.map(str::to_string),
    })))
}

/// A machine that has connected and joined an idle lobby.
fn in_lobby() -> RoundMachine {
    let mut m = machine();
    m.handle(Input::Connected);
    m.handle(join(false, None));
    m
}

fn cues(effects: &[Effect]) -> Vec<Cue> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Play(cue) => Some(*cue),
            _ => None,
        })
        .collect()
}

fn notices(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Notice(_, text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// The last value an effect list sets for `control`.
fn control(effects: &[Effect], control: Control) -> Option<bool> {
    effects.iter().rev().find_map(|e| match e {
        Effect::SetControl(c, enabled) if *c == control => Some(*enabled),
        _ => None,
    })
}

// ════════════════════════════════════════════════════════════════════
// Lobby
// ════════════════════════════════════════════════════════════════════

#[test]
fn joining_walks_through_connecting_to_lobby() {
    let mut m = machine();
    assert_eq!(m.phase(), Phase::Disconnected);

    let effects = m.handle(Input::Connected);
    assert_eq!(m.phase(), Phase::Connecting);
    assert_eq!(
        effects,
        vec![Effect::Emit(ClientEvent::JoinGame { token: "T".into() })]
    );

    let players = vec![LobbyPlayer {
        nickname: "bob".into(),
        points: 3,
        answered: false,
        can_answer: true,
    }];
    let effects = m.handle(server(ServerEvent::JoinSuccess(JoinSuccessPayload {
        players: players.clone(),
        your_nickname: Some("ana".into()),
        round_active: false,
        round_number: None,
    })));
    assert_eq!(m.phase(), Phase::LobbyIdle);
    assert_eq!(m.players(), players.as_slice());
    assert!(effects.contains(&Effect::RenderPlayers(players)));
    assert!(effects.contains(&Effect::Emit(ClientEvent::RequestLeaderboard)));
}

#[test]
fn missing_leaderboard_reply_leaves_lobby_usable() {
    let mut m = in_lobby();
    assert!(m.leaderboard().is_empty());
    m.handle(new_round(1, "S"));
    assert_eq!(m.phase(), Phase::RoundActive);
}

#[test]
fn list_updates_replace_whole_collections() {
    let mut m = in_lobby();
    let first = json!({"players": [{"nickname": "a", "points": 1}, {"nickname": "b", "points": 2}]});
    let second = json!({"players": [{"nickname": "c", "points": 0}]});
    m.handle(server(serde_json::from_value(json!({"event": "player_list_update", "data": first})).unwrap()));
    m.handle(server(serde_json::from_value(json!({"event": "player_list_update", "data": second})).unwrap()));
    assert_eq!(m.players().len(), 1);
    assert_eq!(m.players()[0].nickname, "c");

    let board = json!({"leaderboard": [{"rank": 1, "nickname": "ana", "points": 9}]});
    let effects = m.handle(server(
        serde_json::from_value(json!({"event": "leaderboard_update", "data": board})).unwrap(),
    ));
    assert_eq!(m.leaderboard().len(), 1);
    assert!(matches!(&effects[..], [Effect::RenderLeaderboard(rows)] if rows[0].points == 9));
}

#[test]
fn lobby_presence_plays_join_and_leave_cues() {
    let mut m = in_lobby();
    let joined = m.handle(server(ServerEvent::PlayerJoined {
        nickname: "bob".into(),
        points: Some(4),
    }));
    assert_eq!(cues(&joined), vec![Cue::Join]);
    assert_eq!(notices(&joined), vec!["👋 bob joined".to_string()]);

    let left = m.handle(server(ServerEvent::PlayerLeft {
        nickname: "bob".into(),
        reason: Some(LeaveReason::Disconnect),
    }));
    assert_eq!(cues(&left), vec![Cue::Leave]);
    assert_eq!(
        notices(&left),
        vec!["👋 bob left the lobby (connection lost)".to_string()]
    );
}

#[test]
fn unlisted_leave_reason_still_announces_departure() {
    let mut m = in_lobby();
    let left = m.handle(server(ServerEvent::PlayerLeft {
        nickname: "bo".into(),
        reason: Some(LeaveReason::Other),
    }));
    assert_eq!(cues(&left), vec![Cue::Leave]);
    assert_eq!(notices(&left), vec!["👋 bo left the lobby".to_string()]);
}

#[test]
fn server_error_is_shown_without_state_change() {
    let mut m = in_lobby();
    let effects = m.handle(server(ServerEvent::Error {
        message: "Invalid token".into(),
    }));
    assert_eq!(
        effects,
        vec![Effect::Notice(
            MessageCategory::Error,
            "❌ Error: Invalid token".into()
        )]
    );
    assert_eq!(m.phase(), Phase::LobbyIdle);
}

// ════════════════════════════════════════════════════════════════════
// Answer lifecycle
// ════════════════════════════════════════════════════════════════════

#[test]
fn answer_lifecycle_plays_correct_cue_once() {
    let mut m = in_lobby();

    let started = m.handle(new_round(1, "S"));
    assert_eq!(control(&started, Control::Answer), Some(true));
    assert!(started.contains(&Effect::RenderSlogan {
        round_number: 1,
        slogan: "S".into()
    }));

    let submitted = m.submit_answer("A").unwrap();
    assert_eq!(
        submitted,
        vec![Effect::Emit(ClientEvent::SubmitAnswer {
            token: "T".into(),
            partei: "A".into()
        })]
    );

    let acked = m.handle(accepted("A"));
    assert_eq!(control(&acked, Control::Answer), Some(false));
    assert_eq!(cues(&acked), vec![Cue::Lock]);
    assert!(m.round().unwrap().has_answered_locally);

    let ended = m.handle(round_end(
        "A",
        vec![result("ana", true, Some(true), 1)],
        None,
    ));
    assert_eq!(m.phase(), Phase::RoundEnded);
    assert_eq!(control(&ended, Control::Answer), Some(false));
    assert!(ended.contains(&Effect::UpdatePoints(1)));
    assert_eq!(m.session().unwrap().profile.points, 1);

    let correct = [&acked[..], &ended[..]]
        .concat()
        .iter()
        .filter(|e| **e == Effect::Play(Cue::Correct))
        .count();
    assert_eq!(correct, 1);
}

#[test]
fn wrong_answer_plays_incorrect_cue() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.submit_answer("B").unwrap();
    m.handle(accepted("B"));
    let ended = m.handle(round_end(
        "A",
        vec![result("ana", true, Some(false), 0)],
        None,
    ));
    assert_eq!(cues(&ended), vec![Cue::Incorrect]);
}

#[test]
fn no_answer_plays_no_cue() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    let ended = m.handle(round_end("A", vec![result("ana", true, None, 0)], None));
    assert!(cues(&ended).is_empty());
    assert!(notices(&ended).contains(&"ana: No answer".to_string()));
}

#[test]
fn second_answer_is_rejected_after_acceptance() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.submit_answer("A").unwrap();
    m.handle(accepted("A"));
    assert_eq!(m.submit_answer("B"), Err(ActionError::AlreadyAnswered));
    assert!(m.handle(accepted("A")).is_empty());
}

#[test]
fn round_end_announces_break_and_correct_party() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    let lines = notices(&m.handle(round_end("SPD", Vec::new(), None)));
    assert!(lines.contains(&"Correct answer: SPD".to_string()));
    assert_eq!(lines.last().unwrap(), "⏳ Next round in 5 seconds...");
}

#[test]
fn duplicate_round_end_is_ignored() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.handle(round_end("A", vec![result("ana", true, Some(true), 1)], None));
    assert!(m
        .handle(round_end("A", vec![result("ana", true, Some(true), 1)], None))
        .is_empty());
}

#[test]
fn next_round_resets_answer_state() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.submit_answer("A").unwrap();
    m.handle(accepted("A"));
    m.handle(round_end("A", Vec::new(), Some("https://x/y")));

    let effects = m.handle(new_round(2, "T"));
    let round = m.round().unwrap();
    assert_eq!(round.round_number, 2);
    assert!(!round.has_answered_locally);
    assert!(round.can_answer_locally);
    assert_eq!(round.source, None);
    assert!(!m.has_submitted());
    assert_eq!(control(&effects, Control::Source), Some(false));
}

// ════════════════════════════════════════════════════════════════════
// Late joiners
// ════════════════════════════════════════════════════════════════════

#[test]
fn late_joiner_round_end_is_silent() {
    let mut m = in_lobby();
    let ended = m.handle(round_end(
        "A",
        vec![result("ana", false, None, 0)],
        None,
    ));
    assert_eq!(m.phase(), Phase::RoundEnded);
    assert!(cues(&ended).is_empty());
    assert!(notices(&ended).contains(&"ana: (joined during round)".to_string()));
    assert!(!m.round().unwrap().can_answer_locally);
}

#[test]
fn mid_round_joiner_cannot_answer_until_next_round() {
    let mut m = machine();
    m.handle(Input::Connected);
    m.handle(join(true, Some(3)));

    let effects = m.handle(new_round(3, "S"));
    assert_eq!(control(&effects, Control::Answer), Some(false));
    assert!(notices(&effects)
        .iter()
        .any(|line| line.contains("joined during this round")));
    assert_eq!(m.submit_answer("A"), Err(ActionError::CannotAnswer));
    assert!(m.handle(accepted("A")).is_empty());
    assert!(!m.round().unwrap().has_answered_locally);

    m.handle(round_end("A", vec![result("ana", false, None, 0)], None));
    let next = m.handle(new_round(4, "T"));
    assert_eq!(control(&next, Control::Answer), Some(true));
    assert!(m.submit_answer("A").is_ok());
}

// ════════════════════════════════════════════════════════════════════
// Reconnects
// ════════════════════════════════════════════════════════════════════

#[test]
fn disconnect_locks_controls_and_keeps_session() {
    let mut m = in_lobby();
    m.handle(new_round(5, "S"));
    let effects = m.handle(Input::Disconnected {
        reason: Some("transport close".into()),
    });
    assert_eq!(m.phase(), Phase::Disconnected);
    assert_eq!(control(&effects, Control::Answer), Some(false));
    assert_eq!(control(&effects, Control::Source), Some(false));
    assert!(m.session().is_some());
    assert_eq!(m.submit_answer("A"), Err(ActionError::NoActiveRound));
}

#[test]
fn reconnect_mid_round_rejoins_without_resubmitting() {
    let mut m = in_lobby();
    m.handle(new_round(5, "S"));
    m.submit_answer("A").unwrap();

    m.handle(Input::Disconnected { reason: None });
    let rejoin = m.handle(Input::Connected);
    assert_eq!(
        rejoin,
        vec![Effect::Emit(ClientEvent::JoinGame { token: "T".into() })]
    );

    m.handle(join(true, Some(5)));
    assert_eq!(m.phase(), Phase::LobbyIdle);

    // The server re-announces the running round; we rejoined mid-round.
    let resumed = m.handle(new_round(5, "S"));
    assert_eq!(m.phase(), Phase::RoundActive);
    assert_eq!(control(&resumed, Control::Answer), Some(false));
    assert_eq!(m.submit_answer("A"), Err(ActionError::CannotAnswer));
    assert!(!resumed
        .iter()
        .any(|e| matches!(e, Effect::Emit(ClientEvent::SubmitAnswer { .. }))));
}

#[test]
fn rejoin_during_running_round_cannot_answer_it() {
    let mut m = in_lobby();
    let opened = m.handle(new_round(5, "S"));
    assert_eq!(control(&opened, Control::Answer), Some(true));

    m.handle(Input::Disconnected { reason: None });
    m.handle(Input::Connected);
    m.handle(join(true, Some(5)));

    let resumed = m.handle(new_round(5, "S"));
    assert_eq!(m.phase(), Phase::RoundActive);
    assert_eq!(control(&resumed, Control::Answer), Some(false));
    assert_eq!(
        notices(&resumed),
        vec!["⊘ You joined during this round. Wait for the next one.".to_string()]
    );
    assert_eq!(m.submit_answer("A"), Err(ActionError::CannotAnswer));

    // The next round opens answers again.
    let next = m.handle(new_round(6, "T"));
    assert_eq!(control(&next, Control::Answer), Some(true));
    assert!(m.submit_answer("A").is_ok());
}

#[test]
fn reconnect_then_next_round_opens_answers() {
    let mut m = in_lobby();
    m.handle(new_round(5, "S"));
    m.handle(Input::Disconnected { reason: None });
    m.handle(Input::Connected);
    m.handle(join(false, None));
    assert_eq!(m.phase(), Phase::LobbyIdle);

    let effects = m.handle(new_round(6, "T"));
    assert_eq!(control(&effects, Control::Answer), Some(true));
}

#[test]
fn events_before_join_success_are_dropped() {
    let mut m = machine();
    m.handle(Input::Connected);
    assert!(m.handle(new_round(1, "S")).is_empty());
    assert!(m
        .handle(round_end("A", Vec::new(), None))
        .is_empty());
    assert_eq!(m.phase(), Phase::Connecting);
}

#[test]
fn lower_round_number_is_accepted() {
    let mut m = in_lobby();
    m.handle(new_round(7, "S"));
    m.handle(round_end("A", Vec::new(), None));
    m.handle(new_round(2, "T"));
    assert_eq!(m.round().unwrap().round_number, 2);
    assert_eq!(m.phase(), Phase::RoundActive);
}

// ════════════════════════════════════════════════════════════════════
// Source
// ════════════════════════════════════════════════════════════════════

#[test]
fn url_source_opens_externally() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    let ended = m.handle(round_end("A", Vec::new(), Some("https://x/y")));
    assert_eq!(control(&ended, Control::Source), Some(true));
    assert_eq!(
        m.show_source(),
        Ok(vec![Effect::OpenExternal("https://x/y".into())])
    );
}

#[test]
fn text_source_is_shown_inline() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.handle(round_end("A", Vec::new(), Some("Book, p.42")));
    assert_eq!(
        m.show_source(),
        Ok(vec![Effect::ShowText("Source:\n\nBook, p.42".into())])
    );
}

#[test]
fn empty_source_keeps_button_disabled() {
    for quelle in [None, Some(""), Some("   ")] {
        let mut m = in_lobby();
        m.handle(new_round(1, "S"));
        let ended = m.handle(round_end("A", Vec::new(), quelle));
        assert_eq!(control(&ended, Control::Source), Some(false), "{quelle:?}");
        assert_eq!(m.show_source(), Err(ActionError::NoSource));
    }
}

#[test]
fn source_is_hidden_while_round_runs() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    m.handle(round_end("A", Vec::new(), Some("https://x/y")));
    m.handle(new_round(2, "T"));
    assert_eq!(m.round().unwrap().phase, RoundPhase::Active);
    assert_eq!(m.show_source(), Err(ActionError::NoSource));
}

// ════════════════════════════════════════════════════════════════════
// Leaving
// ════════════════════════════════════════════════════════════════════

#[test]
fn confirmed_leave_resets_state_but_keeps_session() {
    let mut m = in_lobby();
    m.handle(new_round(1, "S"));
    let effects = m.leave_game(true);

    assert_eq!(
        effects.iter().find(|e| matches!(e, Effect::Emit(_))),
        Some(&Effect::Emit(ClientEvent::LeaveGame {
            token: "T".into(),
            reason: LeaveReason::Request
        }))
    );
    assert!(effects.contains(&Effect::CloseChannel));
    assert!(effects.contains(&Effect::ClearTranscript));
    assert_eq!(effects.last(), Some(&Effect::ShowPage(Page::Auth)));

    assert_eq!(m.phase(), Phase::Disconnected);
    assert!(m.round().is_none());
    assert!(m.players().is_empty());
    assert!(m.session().is_some());
}

#[test]
fn leave_while_offline_skips_the_emit() {
    let mut m = in_lobby();
    m.handle(Input::Disconnected { reason: None });
    let effects = m.leave_game(true);
    assert!(!effects.iter().any(|e| matches!(e, Effect::Emit(_))));
    assert!(effects.contains(&Effect::ShowPage(Page::Auth)));
}

#[test]
fn machine_without_session_never_joins_or_submits() {
    let mut m = RoundMachine::new(None, vec!["A".into()]);
    assert!(m.handle(Input::Connected).is_empty());
    assert_eq!(m.submit_answer("A"), Err(ActionError::NoSession));
    assert!(m.leave_game(true).iter().all(|e| !matches!(e, Effect::Emit(_))));
}
