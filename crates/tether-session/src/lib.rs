// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session runtime for the Tether transport.
//!
//! Each logical session is a [`SessionActor`] running as its own tokio task.
//! The actor is the single writer of the session's connection state machine,
//! backoff controller, reliable queue, metrics aggregator and timeline; the UI
//! talks to it through a cloneable [`SessionHandle`]. Sessions share no
//! mutable state, so any number of them can run side by side.

pub mod actor;
pub mod builder;
pub mod command;
pub mod handle;
pub mod settings;
pub mod shutdown;

pub use actor::SessionActor;
pub use builder::SessionBuilder;
pub use handle::SessionHandle;
pub use settings::SessionSettings;
pub use shutdown::{install_signal_handler, shutdown_sessions};
