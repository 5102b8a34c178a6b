// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON wire format of the WebSocket transport.
//!
//! Outbound messages are sent as serialised [`OutboundMessage`] objects.
//! Inbound text is either an ack control frame, `{"type":"ack","id":"..."}`,
//! or a frame with the same shape as an outbound message.

use serde::Deserialize;
use tracing::warn;

use tether_core::{Frame, MessageId, OutboundMessage, TetherError, TransportEvent};

#[derive(Deserialize)]
struct Control {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
}

/// Serialises a message for the wire.
pub fn encode(message: &OutboundMessage) -> Result<String, TetherError> {
    serde_json::to_string(message)
        .map_err(|e| TetherError::Internal(format!("failed to serialise message {}: {e}", message.id)))
}

/// Parses one inbound text payload. Malformed payloads are logged and skipped.
pub fn decode(text: &str) -> Option<TransportEvent> {
    if let Ok(control) = serde_json::from_str::<Control>(text) {
        if control.kind == "ack" {
            return match control.id {
                Some(id) => Some(TransportEvent::Ack {
                    message_id: MessageId(id),
                }),
                None => {
                    warn!("ack frame without id");
                    None
                }
            };
        }
    }

    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => Some(TransportEvent::Frame(frame)),
        Err(e) => {
            warn!(error = %e, len = text.len(), "dropping malformed frame");
            None
        }
    }
}

/// Parses a binary payload holding UTF-8 JSON.
pub fn decode_bytes(bytes: &[u8]) -> Option<TransportEvent> {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode(text),
        Err(e) => {
            warn!(error = %e, "dropping non-UTF-8 binary frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::MessageType;

    #[test]
    fn ack_frames_become_acks() {
        let event = decode(r#"{"type":"ack","id":"m-7"}"#).unwrap();
        assert_eq!(
            event,
            TransportEvent::Ack {
                message_id: MessageId::from("m-7")
            }
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn ack_without_id_is_dropped() {
        assert!(decode(r#"{"type":"ack"}"#).is_none());
        assert!(logs_contain("ack frame without id"));
    }

    #[test]
    fn message_frames_become_frames() {
        let text = r#"{"id":"f1","type":"text","content":"hello","timestamp":"2026-03-01T10:00:00Z"}"#;
        match decode(text) {
            Some(TransportEvent::Frame(frame)) => {
                assert_eq!(frame.id, MessageId::from("f1"));
                assert_eq!(frame.message_type, MessageType::Text);
                assert_eq!(frame.content, serde_json::json!("hello"));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    #[tracing_test::traced_test]
    fn malformed_payloads_are_skipped() {
        assert!(decode("not json").is_none());
        assert!(logs_contain("dropping malformed frame"));
        assert!(logs_contain("len=8"));

        assert!(decode(r#"{"type":"text"}"#).is_none());
        assert!(decode_bytes(&[0xff, 0xfe]).is_none());
        assert!(logs_contain("dropping non-UTF-8 binary frame"));
    }

    #[test]
    fn encoded_message_decodes_as_frame() {
        let msg = OutboundMessage::text("ping?");
        let text = encode(&msg).unwrap();
        assert_eq!(decode(&text), Some(TransportEvent::Frame(msg)));
    }
}
