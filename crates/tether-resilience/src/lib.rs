// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnection primitives for the Tether transport.
//!
//! - [`BackoffPolicy`]: exponential delay with a cap and additive uniform jitter.
//! - [`BackoffController`]: reacts to connection state transitions, counts
//!   attempts and owns the single pending retry timer of a session.

pub mod controller;
pub mod policy;

pub use controller::{BackoffController, BackoffDecision};
pub use policy::BackoffPolicy;
