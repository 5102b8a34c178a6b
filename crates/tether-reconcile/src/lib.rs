// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message reconciliation for the Tether transport.
//!
//! Merges the live message stream with paginated history into one ordered,
//! duplicate-free timeline.

pub mod loader;
pub mod merge;
pub mod timeline;

pub use loader::HistoryLoader;
pub use merge::{MergedTimeline, merge};
pub use timeline::Timeline;
