// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tether realtime transport.
//!
//! This crate provides the error taxonomy, the shared data model and the
//! adapter traits implemented by transports and history sources.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorContext, ErrorKind, ErrorRecord, TetherError};
pub use types::{
    AdapterType, ConnectionState, ConversationId, Frame, HealthStatus, HistoryPage,
    InboundMessage, MessageId, MessageType, OutboundMessage, SessionId, StateTransition,
    TransitionCause, TransportEvent, TransportEvents,
};

pub use traits::{HistorySource, PluginAdapter, Transport};
