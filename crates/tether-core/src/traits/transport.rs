// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for the underlying bidirectional message channel.

use async_trait::async_trait;

use crate::error::TetherError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{OutboundMessage, TransportEvents};

/// A bidirectional message channel (typically a WebSocket) managed by a session.
///
/// `open` resolves once the connection is established or has failed. After a
/// successful open, frames, acks and closure are reported on `events`.
#[async_trait]
pub trait Transport: PluginAdapter {
    /// Opens the connection. An `Authentication` error means the credential was rejected.
    async fn open(&self, events: TransportEvents) -> Result<(), TetherError>;

    /// Sends one serialised message over the open connection.
    async fn send(&self, message: &OutboundMessage) -> Result<(), TetherError>;

    /// Closes the connection cleanly. Closing an already closed transport is not an error.
    async fn close(&self) -> Result<(), TetherError>;
}
