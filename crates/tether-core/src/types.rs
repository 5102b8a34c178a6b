// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the connection, queue, metrics and reconciliation crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;

use crate::error::{ErrorKind, TetherError};

/// Unique identifier for a logical session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a random session id.
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generates a random message id.
    pub fn generate() -> Self {
        MessageId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

/// Identifier of the conversation a history page belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    History,
    Observability,
}

// --- Connection lifecycle ---

/// Lifecycle state of one logical connection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Initial,
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Error,
    Failed,
}

impl ConnectionState {
    /// States in which a transport is open or being opened.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

/// What caused a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum TransitionCause {
    ConnectRequested,
    DisconnectRequested,
    TransportOpened,
    TransportClosed { clean: bool },
    TransportError { kind: ErrorKind },
    HeartbeatTimeout,
    AuthenticationRejected,
    RetryScheduled,
    RetryExhausted,
}

/// One published state change. `from == to` is a re-entry (a failed reconnect attempt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

// --- Messages ---

/// Kind of an outbound or wire-level message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Command,
    System,
    Heartbeat,
}

/// A message handed to the transport. Immutable once created.
///
/// The same shape is used for frames arriving from the transport, see [`Frame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

/// A frame received from the transport.
pub type Frame = OutboundMessage;

impl OutboundMessage {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(message_type: MessageType, content: serde_json::Value) -> Self {
        Self {
            id: MessageId::generate(),
            message_type,
            content,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// A plain text message.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(MessageType::Text, serde_json::Value::String(content.into()))
    }

    /// A heartbeat probe with empty content.
    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, serde_json::Value::Null)
    }

    /// Returns a copy with `key` set in the metadata map.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Whether this is a heartbeat frame.
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == MessageType::Heartbeat
    }
}

/// A chat message as shown in the timeline, from the live stream or a history page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Converts a live frame into a timeline entry.
    ///
    /// The role comes from the `role` metadata key and defaults to `assistant`
    /// for text frames and `system` otherwise.
    pub fn from_frame(frame: &Frame) -> Self {
        let role = frame
            .metadata
            .as_ref()
            .and_then(|m| m.get("role"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| match frame.message_type {
                MessageType::Text => "assistant".to_string(),
                _ => "system".to_string(),
            });
        let content = match &frame.content {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            id: frame.id.clone(),
            role,
            content,
            created_at: frame.timestamp,
        }
    }
}

/// One page of historical messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<InboundMessage>,
    /// Cursor for the next page; `None` when this is the last page.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

// --- Transport events ---

/// Discrete events reported by a transport after it has been opened.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is established.
    Opened,
    /// The connection closed; `clean` is false for abnormal closures.
    Closed { clean: bool, reason: Option<String> },
    /// A transport-level failure.
    Error { message: String },
    /// The handshake rejected the credential.
    AuthenticationRejected { reason: String },
    /// An inbound frame.
    Frame(Frame),
    /// The remote end acknowledged an outbound message.
    Ack { message_id: MessageId },
}

impl TransportEvent {
    /// Maps an `open()` failure to the event the state machine consumes.
    pub fn from_open_error(err: &TetherError) -> Self {
        match err {
            TetherError::Authentication { message, .. } => TransportEvent::AuthenticationRejected {
                reason: message.clone(),
            },
            other => TransportEvent::Error {
                message: other.to_string(),
            },
        }
    }
}

/// Sink handed to a transport on `open()`.
///
/// Every event is tagged with the epoch of the open call that produced it, so the
/// session can discard events from a connection it has already abandoned.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    /// Creates a sink for the given open epoch.
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    /// Epoch this sink belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Emits an event. Returns `false` if the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }

    /// Whether the receiving session has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
