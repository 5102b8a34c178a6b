// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle for one logical session.
//!
//! - [`ConnectionStateMachine`]: the only place a [`ConnectionState`](tether_core::ConnectionState)
//!   is mutated; publishes every transition, in order, to its subscribers.
//! - [`HeartbeatMonitor`]: tracks inbound liveness and heartbeat round trips so a
//!   transport that claims to be open but is silently dead gets detected.

pub mod heartbeat;
pub mod machine;

pub use heartbeat::HeartbeatMonitor;
pub use machine::ConnectionStateMachine;
