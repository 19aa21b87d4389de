//! Socket.IO v5 over Engine.IO v4 text framing.
//!
//! Only the subset a subscribing client needs is handled: the open
//! handshake, namespace connect, heartbeats and JSON events. Binary packets
//! and acknowledgements are reported as [`Frame::Other`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::NetError;

/// Engine.IO pong, sent in reply to a server ping.
pub const PONG: &str = "3";

/// Socket.IO disconnect from the default namespace.
pub const DISCONNECT: &str = "41";

/// Parameters announced by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    /// Namespace connect acknowledged.
    Connected,
    /// Namespace connect refused by the server.
    ConnectError(String),
    /// Server closed the namespace.
    Disconnected,
    Event { name: String, payload: Value },
    Other,
}

/// Namespace connect packet for the default namespace, carrying the token
/// as the auth payload.
pub fn encode_connect(token: &str) -> String {
    format!("40{}", json!({ "token": token }))
}

pub fn decode(text: &str) -> Result<Frame, NetError> {
    let mut chars = text.chars();
    let engine_type = chars
        .next()
        .ok_or_else(|| NetError::Decode("empty frame".into()))?;
    let rest = chars.as_str();

    match engine_type {
        '0' => Ok(Frame::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket_packet(rest),
        '5' | '6' => Ok(Frame::Other),
        other => Err(NetError::Decode(format!("unknown engine packet type {other:?}"))),
    }
}

fn decode_socket_packet(packet: &str) -> Result<Frame, NetError> {
    let mut chars = packet.chars();
    let packet_type = chars
        .next()
        .ok_or_else(|| NetError::Decode("empty socket packet".into()))?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match packet_type {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnected),
        '2' => decode_event(body),
        '4' => {
            let reason = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError(reason))
        }
        '3' | '5' | '6' => Ok(Frame::Other),
        other => Err(NetError::Decode(format!("unknown socket packet type {other:?}"))),
    }
}

fn decode_event(body: &str) -> Result<Frame, NetError> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Array(mut items) = value else {
        return Err(NetError::Decode("event body is not an array".into()));
    };
    if items.is_empty() {
        return Err(NetError::Decode("event without a name".into()));
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        other => return Err(NetError::Decode(format!("event name is not a string: {other}"))),
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };

    Ok(Frame::Event { name, payload })
}

// "/admin,..." -> "..."
fn strip_namespace(s: &str) -> &str {
    if s.starts_with('/') {
        match s.find(',') {
            Some(idx) => &s[idx + 1..],
            None => "",
        }
    } else {
        s
    }
}

// Leading digits are an acknowledgement id.
fn strip_ack_id(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let frame = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Open(OpenInfo {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn decodes_heartbeats_and_connect() {
        assert_eq!(decode("2").unwrap(), Frame::Ping);
        assert_eq!(decode("3").unwrap(), Frame::Pong);
        assert_eq!(decode(r#"40{"sid":"xyz"}"#).unwrap(), Frame::Connected);
        assert_eq!(decode("41").unwrap(), Frame::Disconnected);
        assert_eq!(decode("1").unwrap(), Frame::Close);
    }

    #[test]
    fn decodes_event_with_payload() {
        let frame = decode(r#"42["newChannel",{"id":6,"name":"memes","removable":true}]"#).unwrap();
        match frame {
            Frame::Event { name, payload } => {
                assert_eq!(name, "newChannel");
                assert_eq!(payload["name"], "memes");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn strips_namespace_and_ack_id() {
        let frame = decode(r#"42/chat,17["removeChannel",{"id":3}]"#).unwrap();
        assert!(matches!(frame, Frame::Event { ref name, .. } if name == "removeChannel"));
    }

    #[test]
    fn event_without_payload_is_null() {
        let frame = decode(r#"42["ping"]"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event {
                name: "ping".into(),
                payload: Value::Null
            }
        );
    }

    #[test]
    fn connect_error_reason() {
        assert_eq!(
            decode(r#"44{"message":"not authorized"}"#).unwrap(),
            Frame::ConnectError("not authorized".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("9").is_err());
        assert!(decode("42{not json").is_err());
        assert!(decode(r#"42[1,2]"#).is_err());
    }

    #[test]
    fn connect_packet_carries_token() {
        assert_eq!(encode_connect("t0k"), r#"40{"token":"t0k"}"#);
    }
}
