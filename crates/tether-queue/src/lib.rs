// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reliable outbound message queue.
//!
//! The queue only decides; it never performs I/O. [`ReliableQueue::flush`]
//! returns a [`FlushPlan`] naming the messages to hand to the transport and
//! the items that ran out of attempts, and the session actor carries it out.

pub mod queue;

pub use queue::{Dispatch, Enqueued, FlushPlan, QueueItem, QueueLimits, ReliableQueue, Undelivered};
