//! Wire-format envelopes exchanged with `WebSocket` clients.
//!
//! Every frame in either direction is a JSON object carrying a `type` tag, a
//! `data` payload, and a millisecond-epoch `timestamp`. Envelopes produced by
//! unicast sends additionally carry the target `clientId`; broadcast
//! envelopes never do.

use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Reserved `type` tags generated or interpreted by the server itself.
pub mod message_type {
    /// Inbound heartbeat request. Answered internally, never dispatched.
    pub const PING: &str = "ping";
    /// Heartbeat reply carrying the reply timestamp in `data.timestamp`.
    pub const PONG: &str = "pong";
    /// Welcome envelope sent to a client right after registration.
    pub const CONNECTED: &str = "connected";
    /// Reply to a frame the server could not parse.
    pub const ERROR: &str = "error";
    /// Conventional default tag for application sends.
    pub const MESSAGE: &str = "message";
}

/// Welcome text carried in the `connected` envelope payload.
const WELCOME: &str = "Connected to uplink server";

/// Fixed reply text for unparseable frames.
const INVALID_FORMAT: &str = "Invalid message format";

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A server-to-client message envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    /// Message tag: application-chosen or one of [`message_type`].
    #[serde(rename = "type")]
    pub message_type: String,
    /// Arbitrary JSON payload.
    pub data: Value,
    /// Envelope generation time, milliseconds since epoch.
    pub timestamp: i64,
    /// Target client, present only on unicast sends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

impl OutboundEnvelope {
    /// Build an envelope with no target client (broadcasts, protocol replies).
    #[must_use]
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
            timestamp: now_ms(),
            client_id: None,
        }
    }

    /// Build an envelope addressed to a single client.
    #[must_use]
    pub fn for_client(client_id: ClientId, message_type: impl Into<String>, data: Value) -> Self {
        Self {
            client_id: Some(client_id),
            ..Self::new(message_type, data)
        }
    }

    /// Welcome envelope confirming registration to the new client.
    #[must_use]
    pub fn connected(client_id: &ClientId) -> Self {
        Self::new(
            message_type::CONNECTED,
            json!({
                "clientId": client_id,
                "message": WELCOME,
                "timestamp": now_ms(),
            }),
        )
    }

    /// Heartbeat reply to an inbound `ping`.
    #[must_use]
    pub fn pong() -> Self {
        Self::new(message_type::PONG, json!({ "timestamp": now_ms() }))
    }

    /// Error reply for a frame that could not be parsed.
    #[must_use]
    pub fn invalid_format() -> Self {
        Self::new(
            message_type::ERROR,
            json!({ "message": INVALID_FORMAT, "timestamp": now_ms() }),
        )
    }

    /// Serialize to the wire string.
    ///
    /// Infallible in practice: every field serializes, so failures reduce to
    /// a `serde_json` internal error, which is reported as the error reply.
    #[must_use]
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"type\":\"{}\",\"data\":null,\"timestamp\":{}}}",
                message_type::ERROR,
                now_ms()
            )
        })
    }
}

/// A client-to-server frame after JSON parsing.
///
/// `type` is required; a frame without it is malformed and takes the
/// error-reply path. `data` defaults to JSON `null` when absent. Any
/// client-supplied `clientId` or `timestamp` fields are ignored: the server
/// derives both itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Message tag chosen by the client.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Arbitrary JSON payload (`null` when absent).
    #[serde(default)]
    pub data: Value,
}

/// An inbound message as handed to the `on_message` callback.
///
/// `client_id` and `timestamp` are derived by the server at receipt time,
/// never taken from the wire payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    /// Message tag from the inbound frame.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Payload from the inbound frame.
    pub data: Value,
    /// Receipt time, milliseconds since epoch.
    pub timestamp: i64,
    /// The sending client, resolved from connection metadata.
    pub client_id: ClientId,
}

impl ClientMessage {
    /// Build from a parsed frame plus the server-resolved sender.
    #[must_use]
    pub fn from_frame(frame: InboundFrame, client_id: ClientId) -> Self {
        Self {
            message_type: frame.message_type,
            data: frame.data,
            timestamp: now_ms(),
            client_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── OutboundEnvelope serde ──────────────────────────────────────

    #[test]
    fn broadcast_envelope_omits_client_id() {
        let env = OutboundEnvelope::new("evt", json!({"x": 1}));
        let json = env.to_wire();
        assert!(!json.contains("clientId"));
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "evt");
        assert_eq!(v["data"], json!({"x": 1}));
        assert!(v["timestamp"].is_i64());
    }

    #[test]
    fn unicast_envelope_carries_client_id() {
        let id = ClientId::from("client-1");
        let env = OutboundEnvelope::for_client(id, "evt", json!("payload"));
        let v: Value = serde_json::from_str(&env.to_wire()).unwrap();
        assert_eq!(v["clientId"], "client-1");
        assert_eq!(v["data"], "payload");
    }

    #[test]
    fn envelope_roundtrip() {
        let env = OutboundEnvelope::for_client(ClientId::from("c"), "t", json!([1, 2, 3]));
        let back: OutboundEnvelope = serde_json::from_str(&env.to_wire()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn connected_payload_shape() {
        let id = ClientId::from("abc");
        let env = OutboundEnvelope::connected(&id);
        assert_eq!(env.message_type, message_type::CONNECTED);
        assert!(env.client_id.is_none(), "target travels inside data");
        assert_eq!(env.data["clientId"], "abc");
        assert!(env.data["message"].as_str().is_some_and(|m| !m.is_empty()));
        assert!(env.data["timestamp"].is_i64());
    }

    #[test]
    fn pong_carries_timestamp() {
        let env = OutboundEnvelope::pong();
        assert_eq!(env.message_type, message_type::PONG);
        assert!(env.data["timestamp"].is_i64());
    }

    #[test]
    fn invalid_format_carries_fixed_message() {
        let env = OutboundEnvelope::invalid_format();
        assert_eq!(env.message_type, message_type::ERROR);
        assert_eq!(env.data["message"], INVALID_FORMAT);
        assert!(env.data["timestamp"].is_i64());
    }

    // ── InboundFrame parsing ────────────────────────────────────────

    #[test]
    fn frame_parses_type_and_data() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"chat","data":{"text":"hi"}}"#)
            .unwrap();
        assert_eq!(frame.message_type, "chat");
        assert_eq!(frame.data, json!({"text": "hi"}));
    }

    #[test]
    fn frame_data_defaults_to_null() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(frame.message_type, "ping");
        assert!(frame.data.is_null());
    }

    #[test]
    fn frame_without_type_is_rejected() {
        let err = serde_json::from_str::<InboundFrame>(r#"{"data":{"x":1}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn frame_rejects_non_object() {
        assert!(serde_json::from_str::<InboundFrame>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<InboundFrame>("\"hello\"").is_err());
        assert!(serde_json::from_str::<InboundFrame>("not json at all").is_err());
    }

    #[test]
    fn frame_ignores_wire_supplied_metadata() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"chat","data":1,"clientId":"spoofed","timestamp":0}"#)
                .unwrap();
        assert_eq!(frame.message_type, "chat");
        assert_eq!(frame.data, json!(1));
    }

    // ── ClientMessage ───────────────────────────────────────────────

    #[test]
    fn client_message_derives_sender_and_timestamp() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"chat","data":{"text":"hello"}}"#).unwrap();
        let before = now_ms();
        let msg = ClientMessage::from_frame(frame, ClientId::from("real-id"));
        assert_eq!(msg.message_type, "chat");
        assert_eq!(msg.client_id.as_str(), "real-id");
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn client_message_serializes_camel_case() {
        let msg = ClientMessage {
            message_type: "chat".into(),
            data: json!(null),
            timestamp: 1_700_000_000_000,
            client_id: ClientId::from("c1"),
        };
        let v: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "chat");
        assert_eq!(v["clientId"], "c1");
        assert_eq!(v["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn now_ms_is_recent() {
        // 2023-01-01 in ms; anything earlier means the clock source broke
        assert!(now_ms() > 1_672_531_200_000);
    }
}
