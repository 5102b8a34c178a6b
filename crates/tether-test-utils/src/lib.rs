// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tether integration tests.
//!
//! Provides mock adapters and a session harness for fast, deterministic,
//! CI-runnable tests without a network.
//!
//! # Components
//!
//! - [`MockTransport`] - Scriptable transport with send capture and event injection
//! - [`MockHistory`] - History source serving canned pages
//! - [`SessionHarness`] - A spawned session wired to both mocks

pub mod harness;
pub mod mock_history;
pub mod mock_transport;

pub use harness::{SessionHarness, SessionHarnessBuilder};
pub use mock_history::MockHistory;
pub use mock_transport::{MockTransport, OpenOutcome};
