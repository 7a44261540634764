#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Event channel tests over a live in-memory transport.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use common::{live_connector, round_end, sent_events, test_config, wait_until};
use wahlplakat_client::protocol::{ClientEvent, LeaveReason};
use wahlplakat_client::{ChannelEvent, ClientError, EventChannel, ServerEvent};

async fn next(rx: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event channel closed")
}

// ════════════════════════════════════════════════════════════════════
// Handshake & events
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn handshake_then_typed_events() {
    common::init_tracing();
    let (connector, servers, sent) = live_connector(1);
    let (channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    servers[0].handshake();
    assert_eq!(next(&mut rx).await, ChannelEvent::Connected);
    assert!(channel.is_connected());
    assert_eq!(channel.session_id().await.as_deref(), Some("test-sid"));
    assert_eq!(sent.lock().unwrap().first().map(String::as_str), Some("40"));

    servers[0].event("new_round", json!({"round_number": 1, "wahlspruch": "S"}));
    assert_eq!(
        next(&mut rx).await,
        ChannelEvent::Event(ServerEvent::NewRound {
            round_number: 1,
            wahlspruch: "S".into(),
            wahlspruch_id: None
        })
    );
}

#[tokio::test]
async fn unknown_events_are_skipped() {
    common::init_tracing();
    let (connector, servers, _sent) = live_connector(1);
    let (_channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    servers[0].handshake();
    assert_eq!(next(&mut rx).await, ChannelEvent::Connected);

    servers[0].event("confetti", json!({"colour": "gold"}));
    servers[0].push("42not json");
    servers[0].event("player_answered", json!({"nickname": "bob"}));
    assert_eq!(
        next(&mut rx).await,
        ChannelEvent::Event(ServerEvent::PlayerAnswered {
            nickname: "bob".into()
        })
    );
}

#[tokio::test]
async fn slow_consumer_still_receives_every_event_in_order() {
    common::init_tracing();
    let (connector, servers, _sent) = live_connector(1);
    let config = test_config(0).with_event_channel_capacity(2);
    let (_channel, mut rx) = EventChannel::connect(connector, &config);

    servers[0].handshake();
    servers[0].event("new_round", json!({"round_number": 1, "wahlspruch": "S"}));
    servers[0].event("answer_accepted", json!({"partei": "A"}));
    servers[0].event("round_end", round_end("A", json!([]), json!(null)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut names = Vec::new();
    for _ in 0..4 {
        names.push(match next(&mut rx).await {
            ChannelEvent::Connected => "connected",
            ChannelEvent::Event(event) => event.name(),
            other => panic!("unexpected {other:?}"),
        });
    }
    assert_eq!(
        names,
        vec!["connected", "new_round", "answer_accepted", "round_end"]
    );
}

#[tokio::test]
async fn pings_are_answered() {
    common::init_tracing();
    let (connector, servers, sent) = live_connector(1);
    let (_channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    servers[0].handshake();
    next(&mut rx).await;
    servers[0].push("2");
    wait_until(|| sent.lock().unwrap().iter().any(|p| p == "3")).await;
}

// ════════════════════════════════════════════════════════════════════
// Emits
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn emit_requires_namespace_join() {
    common::init_tracing();
    let (connector, servers, sent) = live_connector(1);
    let (channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    let early = channel.emit(ClientEvent::RequestLeaderboard);
    assert!(matches!(early, Err(ClientError::NotConnected)));

    servers[0].handshake();
    next(&mut rx).await;
    channel
        .emit(ClientEvent::JoinGame { token: "T".into() })
        .unwrap();
    wait_until(|| sent_events(&sent, "join_game").len() == 1).await;
    assert_eq!(sent_events(&sent, "join_game")[0], json!({"token": "T"}));
}

#[tokio::test]
async fn leave_emitted_right_before_disconnect_is_delivered() {
    common::init_tracing();
    let (connector, servers, sent) = live_connector(1);
    let (mut channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    servers[0].handshake();
    next(&mut rx).await;

    channel
        .emit(ClientEvent::LeaveGame {
            token: "T".into(),
            reason: LeaveReason::Request,
        })
        .unwrap();
    channel.disconnect().await;

    assert_eq!(
        sent_events(&sent, "leave_game"),
        vec![json!({"token": "T", "reason": "request"})]
    );
    assert_eq!(sent.lock().unwrap().last().map(String::as_str), Some("41"));
    assert_eq!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            reason: Some("client shut down".into()),
            will_reconnect: false
        }
    );
    assert!(!channel.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reconnects_after_server_drop() {
    common::init_tracing();
    let (connector, servers, _sent) = live_connector(2);
    let connects = std::sync::Arc::clone(&connector.connects);
    let (channel, mut rx) = EventChannel::connect(connector, &test_config(3));

    servers[0].handshake();
    assert_eq!(next(&mut rx).await, ChannelEvent::Connected);

    servers[0].drop_connection();
    assert!(matches!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            will_reconnect: true,
            ..
        }
    ));
    assert!(!channel.is_connected());

    servers[1].handshake();
    assert_eq!(next(&mut rx).await, ChannelEvent::Connected);
    assert_eq!(connects.load(Ordering::SeqCst), 2);
    assert!(channel.is_connected());
}

#[tokio::test]
async fn emit_during_outage_is_not_replayed() {
    common::init_tracing();
    let (connector, servers, sent) = live_connector(2);
    let (channel, mut rx) = EventChannel::connect(connector, &test_config(3));

    servers[0].handshake();
    next(&mut rx).await;
    servers[0].drop_connection();
    next(&mut rx).await;

    assert!(matches!(
        channel.emit(ClientEvent::RequestLeaderboard),
        Err(ClientError::NotConnected)
    ));

    servers[1].handshake();
    assert_eq!(next(&mut rx).await, ChannelEvent::Connected);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sent_events(&sent, "request_leaderboard").is_empty());
}

#[tokio::test]
async fn server_close_packet_ends_session() {
    common::init_tracing();
    let (connector, servers, _sent) = live_connector(1);
    let (_channel, mut rx) = EventChannel::connect(connector, &test_config(0));

    servers[0].handshake();
    next(&mut rx).await;
    servers[0].push("1");
    assert_eq!(
        next(&mut rx).await,
        ChannelEvent::Disconnected {
            reason: Some("server closed the session".into()),
            will_reconnect: false
        }
    );
    assert!(rx.recv().await.is_none());
}
