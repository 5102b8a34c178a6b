// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mailbox messages from [`SessionHandle`](crate::SessionHandle) to the actor.

use tokio::sync::oneshot;

use tether_bus::Subscription;
use tether_core::{HistoryPage, MessageId, OutboundMessage, TetherError};
use tether_metrics::ConnectionMetrics;
use tether_queue::QueueItem;
use tether_reconcile::MergedTimeline;

pub type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
pub enum SessionCommand {
    Connect(Reply<Result<(), TetherError>>),
    Disconnect(Reply<Result<(), TetherError>>),
    Send {
        message: OutboundMessage,
        reply: Reply<Result<MessageId, TetherError>>,
    },
    /// Flush now; replies with the number of sends performed.
    Flush(Reply<usize>),
    MetricsSnapshot(Reply<ConnectionMetrics>),
    MergedTimeline(Reply<MergedTimeline>),
    /// History fetched by the handle, to be merged into the timeline.
    HistoryLoaded {
        pages: Vec<HistoryPage>,
        reply: Reply<MergedTimeline>,
    },
    Subscribe(Reply<Subscription>),
    FailedMessages(Reply<Vec<QueueItem>>),
    TakeFailed(Reply<Vec<QueueItem>>),
    RetryFailed {
        id: MessageId,
        reply: Reply<Result<bool, TetherError>>,
    },
    Shutdown(Reply<()>),
}
