// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tether transport layer.
//!
//! Three specialisations carry the delivery semantics: [`TetherError::Connection`]
//! is recovered locally through backoff, [`TetherError::Authentication`] is never
//! retried, and [`TetherError::Message`] is reported per queued item without
//! touching the connection state.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::types::{ConnectionState, MessageId};

/// Machine-readable code and metadata attached to the specialised errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Short stable code, e.g. `heartbeat_timeout` or `http_401`.
    pub code: Option<String>,
    /// Free-form key/value details.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Context with only a code set.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The primary error type used across all Tether crates.
#[derive(Debug, Error)]
pub enum TetherError {
    /// Transport failed to open, closed abnormally, or the heartbeat timed out.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        context: ErrorContext,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential rejected by the transport handshake.
    #[error("authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// A queued message exhausted its retry budget without acknowledgment.
    #[error("message {message_id} not acknowledged after {attempts} attempts")]
    Message {
        message_id: MessageId,
        attempts: u32,
        context: ErrorContext,
    },

    /// An input that the connection state machine does not accept in its current state.
    #[error("input `{input}` is not valid while {state}")]
    InvalidTransition {
        state: ConnectionState,
        input: String,
    },

    /// The bounded queue is full and holds no unsent item that could be evicted.
    #[error("queue full: all {capacity} queued messages are in flight")]
    QueueFull { capacity: usize },

    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The session actor has stopped and no longer accepts commands.
    #[error("session closed")]
    SessionClosed,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`TetherError`], used in events and metrics labels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Authentication,
    Message,
    InvalidTransition,
    QueueFull,
    Config,
    Timeout,
    SessionClosed,
    Internal,
}

impl TetherError {
    /// Connection error without an underlying source.
    pub fn connection(message: impl Into<String>) -> Self {
        TetherError::Connection {
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Connection error with a code, e.g. `heartbeat_timeout`.
    pub fn connection_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        TetherError::Connection {
            message: message.into(),
            context: ErrorContext::with_code(code),
            source: None,
        }
    }

    /// Authentication error without a code.
    pub fn authentication(message: impl Into<String>) -> Self {
        TetherError::Authentication {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Per-message delivery failure.
    pub fn message_undelivered(message_id: MessageId, attempts: u32) -> Self {
        TetherError::Message {
            message_id,
            attempts,
            context: ErrorContext::with_code("max_retries_exceeded"),
        }
    }

    /// Returns the discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TetherError::Connection { .. } => ErrorKind::Connection,
            TetherError::Authentication { .. } => ErrorKind::Authentication,
            TetherError::Message { .. } => ErrorKind::Message,
            TetherError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            TetherError::QueueFull { .. } => ErrorKind::QueueFull,
            TetherError::Config(_) => ErrorKind::Config,
            TetherError::Timeout { .. } => ErrorKind::Timeout,
            TetherError::SessionClosed => ErrorKind::SessionClosed,
            TetherError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Code and metadata of the specialised variants.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TetherError::Connection { context, .. }
            | TetherError::Authentication { context, .. }
            | TetherError::Message { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Machine-readable code, if any.
    pub fn code(&self) -> Option<&str> {
        self.context().and_then(|c| c.code.as_deref())
    }

    /// Whether the backoff path may recover from this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TetherError::Connection { .. } | TetherError::Timeout { .. }
        )
    }
}

/// Cloneable summary of an error, kept by the metrics aggregator and carried in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Records `err` as observed at `at`.
    pub fn new(err: &TetherError, at: DateTime<Utc>) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            code: err.code().map(str::to_string),
            at,
        }
    }
}
