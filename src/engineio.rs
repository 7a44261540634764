//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! The game server speaks Socket.IO. Every transport frame is one Engine.IO
//! packet (a type digit followed by an optional payload); Engine.IO
//! `message` packets carry a Socket.IO packet, whose `event` variant holds a
//! JSON array `["name", data]`. Only the default namespace and text packets
//! are supported; binary attachments never occur in this game.
//!
//! ```
//! use wahlplakat_client::engineio::{self, Packet, SocketPacket};
//!
//! let packet = engineio::decode(r#"42["player_answered",{"nickname":"ana"}]"#).unwrap();
//! assert!(matches!(packet, Packet::Message(SocketPacket::Event(_))));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::protocol::{ClientEvent, ServerEvent};

/// Engine.IO protocol revision requested in the connection query.
pub const ENGINE_IO_VERSION: &str = "4";

/// Separator between packets in one long-polling payload.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Parameters announced by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// A decoded Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A decoded Socket.IO packet (default namespace only).
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect request (client) or acknowledgement (server).
    Connect(Option<Value>),
    Disconnect,
    /// An event, already reshaped to `{"event": name, "data": payload}`.
    Event(Value),
    /// Acknowledgement of an event we sent. The game never requests acks.
    Ack,
    ConnectError(String),
}

/// Decode one Engine.IO packet.
///
/// # Errors
///
/// Returns [`ClientError::Protocol`] for unknown packet types, malformed
/// payloads or binary Socket.IO packets.
pub fn decode(text: &str) -> Result<Packet> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::Protocol("empty engine.io packet".into()))?;
    let payload = chars.as_str();
    let optional = |p: &str| (!p.is_empty()).then(|| p.to_string());

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(payload)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping(optional(payload))),
        '3' => Ok(Packet::Pong(optional(payload))),
        '4' => decode_socket(payload).map(Packet::Message),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(ClientError::Protocol(format!(
            "unknown engine.io packet type {other:?}"
        ))),
    }
}

fn decode_socket(text: &str) -> Result<SocketPacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ClientError::Protocol("empty socket.io packet".into()))?;
    let body = strip_namespace(chars.as_str());

    match kind {
        '0' => {
            if body.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                Ok(SocketPacket::Connect(Some(serde_json::from_str(body)?)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let json = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let array: Value = serde_json::from_str(json)?;
            array_to_tagged(array).map(SocketPacket::Event)
        }
        '3' => Ok(SocketPacket::Ack),
        '4' => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| body.to_string());
            Ok(SocketPacket::ConnectError(message))
        }
        '5' | '6' => Err(ClientError::Protocol(
            "binary socket.io packets are not supported".into(),
        )),
        other => Err(ClientError::Protocol(format!(
            "unknown socket.io packet type {other:?}"
        ))),
    }
}

/// Drop a `/namespace,` prefix. The default namespace is never prefixed.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.split_once(',') {
            Some((_, rest)) => rest,
            None => "",
        }
    } else {
        body
    }
}

fn array_to_tagged(array: Value) -> Result<Value> {
    let Value::Array(items) = array else {
        return Err(ClientError::Protocol("socket.io event is not an array".into()));
    };
    let mut items = items.into_iter();
    let name = match items.next() {
        Some(Value::String(name)) => name,
        _ => {
            return Err(ClientError::Protocol(
                "socket.io event has no name".into(),
            ))
        }
    };
    let mut tagged = serde_json::Map::new();
    tagged.insert("event".into(), Value::String(name));
    if let Some(data) = items.next() {
        if !data.is_null() {
            tagged.insert("data".into(), data);
        }
    }
    Ok(Value::Object(tagged))
}

fn tagged_to_array(tagged: Value) -> Result<Value> {
    let Value::Object(mut map) = tagged else {
        return Err(ClientError::Protocol("event did not serialize to an object".into()));
    };
    let name = map
        .remove("event")
        .ok_or_else(|| ClientError::Protocol("event has no name".into()))?;
    let mut items = vec![name];
    if let Some(data) = map.remove("data") {
        items.push(data);
    }
    Ok(Value::Array(items))
}

/// Encode one Engine.IO packet.
///
/// # Errors
///
/// Fails only when a handshake or connect payload cannot be serialized.
pub fn encode(packet: &Packet) -> Result<String> {
    Ok(match packet {
        Packet::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
        Packet::Close => "1".into(),
        Packet::Ping(probe) => format!("2{}", probe.as_deref().unwrap_or_default()),
        Packet::Pong(probe) => format!("3{}", probe.as_deref().unwrap_or_default()),
        Packet::Message(socket) => format!("4{}", encode_socket(socket)?),
        Packet::Upgrade => "5".into(),
        Packet::Noop => "6".into(),
    })
}

fn encode_socket(packet: &SocketPacket) -> Result<String> {
    Ok(match packet {
        SocketPacket::Connect(None) => "0".into(),
        SocketPacket::Connect(Some(auth)) => format!("0{}", serde_json::to_string(auth)?),
        SocketPacket::Disconnect => "1".into(),
        SocketPacket::Event(tagged) => {
            format!("2{}", serde_json::to_string(&tagged_to_array(tagged.clone())?)?)
        }
        SocketPacket::Ack => "3[]".into(),
        SocketPacket::ConnectError(message) => {
            format!("4{}", serde_json::json!({ "message": message }))
        }
    })
}

/// Frame a client event as an Engine.IO message packet (`42[...]`).
///
/// # Errors
///
/// Returns [`ClientError::Serialization`] if the event cannot be serialized.
pub fn encode_event(event: &ClientEvent) -> Result<String> {
    let tagged = serde_json::to_value(event)?;
    encode(&Packet::Message(SocketPacket::Event(tagged)))
}

/// Interpret a decoded event packet as a typed server event.
///
/// # Errors
///
/// Returns [`ClientError::Serialization`] for unknown event names or
/// payloads that do not match the expected shape.
pub fn decode_event(tagged: Value) -> Result<ServerEvent> {
    Ok(serde_json::from_value(tagged)?)
}

/// Split a long-polling payload into individual packets.
pub fn split_payload(payload: &str) -> impl Iterator<Item = &str> {
    payload.split(RECORD_SEPARATOR).filter(|p| !p.is_empty())
}

/// Join packets into one long-polling payload.
pub fn join_payload<I, S>(packets: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, packet) in packets.into_iter().enumerate() {
        if i > 0 {
            out.push(RECORD_SEPARATOR);
        }
        out.push_str(packet.as_ref());
    }
    out
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
    use crate::protocol::LeaveReason;

    #[test]
    fn decodes_open_handshake() {
        let packet = decode(
            r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let Packet::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "abc");
        assert_eq!(handshake.upgrades, vec!["websocket".to_string()]);
        assert_eq!(handshake.ping_interval, 25_000);
        assert_eq!(handshake.max_payload, Some(1_000_000));
    }

    #[test]
    fn decodes_ping_with_and_without_probe() {
        assert_eq!(decode("2").unwrap(), Packet::Ping(None));
        assert_eq!(decode("2probe").unwrap(), Packet::Ping(Some("probe".into())));
    }

    #[test]
    fn decodes_namespace_connect_ack() {
        let packet = decode(r#"40{"sid":"xyz"}"#).unwrap();
        let Packet::Message(SocketPacket::Connect(Some(payload))) = packet else {
            panic!("expected connect ack");
        };
        assert_eq!(payload["sid"], "xyz");
    }

    #[test]
    fn decodes_event_into_typed_server_event() {
        let packet = decode(r#"42["answer_accepted",{"partei":"SPD"}]"#).unwrap();
        let Packet::Message(SocketPacket::Event(tagged)) = packet else {
            panic!("expected event");
        };
        let event = decode_event(tagged).unwrap();
        assert_eq!(
            event,
            ServerEvent::AnswerAccepted {
                partei: "SPD".into()
            }
        );
    }

    #[test]
    fn event_with_ack_id_and_namespace_is_tolerated() {
        let packet = decode(r#"42/game,17["error",{"message":"nope"}]"#).unwrap();
        let Packet::Message(SocketPacket::Event(tagged)) = packet else {
            panic!("expected event");
        };
        assert_eq!(tagged["event"], "error");
        assert_eq!(tagged["data"]["message"], "nope");
    }

    #[test]
    fn encodes_client_event_as_array() {
        let frame = encode_event(&ClientEvent::LeaveGame {
            token: "T".into(),
            reason: LeaveReason::Request,
        })
        .unwrap();
        assert_eq!(frame, r#"42["leave_game",{"token":"T","reason":"request"}]"#);
    }

    #[test]
    fn encodes_event_without_payload() {
        let frame = encode_event(&ClientEvent::RequestLeaderboard).unwrap();
        assert_eq!(frame, r#"42["request_leaderboard"]"#);
    }

    #[test]
    fn connect_error_exposes_message() {
        let packet = decode(r#"44{"message":"not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::ConnectError("not authorized".into()))
        );
    }

    #[test]
    fn rejects_binary_and_unknown_packets() {
        assert!(matches!(decode("45-[]"), Err(ClientError::Protocol(_))));
        assert!(matches!(decode("9"), Err(ClientError::Protocol(_))));
        assert!(matches!(decode(""), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn polling_payload_split_and_join() {
        let joined = join_payload(["2", "42[\"x\"]"]);
        assert_eq!(joined, "2\u{1e}42[\"x\"]");
        let parts: Vec<&str> = split_payload(&joined).collect();
        assert_eq!(parts, vec!["2", "42[\"x\"]"]);
    }

    #[test]
    fn unknown_event_name_fails_typed_decode() {
        let packet = decode(r#"42["mystery",{}]"#).unwrap();
        let Packet::Message(SocketPacket::Event(tagged)) = packet else {
            panic!("expected event");
        };
        assert!(decode_event(tagged).is_err());
    }
}
