// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Network adapters for Tether sessions.
//!
//! [`WsTransport`] carries JSON messages over a WebSocket and reports acks,
//! frames and closure as transport events. [`HttpHistory`] fetches paged
//! conversation history over REST.

pub mod history;
pub mod transport;
pub mod wire;

pub use history::HttpHistory;
pub use transport::WsTransport;
