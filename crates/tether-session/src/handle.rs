// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! UI-facing handle to a running session.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use tether_bus::Subscription;
use tether_core::{
    ConnectionState, ConversationId, MessageId, OutboundMessage, SessionId, TetherError,
};
use tether_metrics::ConnectionMetrics;
use tether_queue::QueueItem;
use tether_reconcile::{HistoryLoader, MergedTimeline};

use crate::command::{Reply, SessionCommand};

/// Cloneable handle to one session actor.
///
/// Every method fails with [`TetherError::SessionClosed`] once the actor has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
    history: Option<HistoryLoader>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        commands: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<ConnectionState>,
        history: Option<HistoryLoader>,
    ) -> Self {
        Self {
            id,
            commands,
            state,
            history,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Latest connection state published by the actor.
    pub fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that is notified on every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until the session reaches `target`, for at most `timeout`.
    pub async fn wait_for_state(
        &self,
        target: ConnectionState,
        timeout: Duration,
    ) -> Result<(), TetherError> {
        let mut rx = self.state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|state| *state == target)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TetherError::SessionClosed),
            Err(_) => Err(TetherError::Timeout { duration: timeout }),
        }
    }

    /// Starts connecting. Returns once the request is accepted, not once connected.
    pub async fn connect(&self) -> Result<(), TetherError> {
        self.request(SessionCommand::Connect).await?
    }

    /// Disconnects, cancelling any pending retry. Queued messages are kept.
    pub async fn disconnect(&self) -> Result<(), TetherError> {
        self.request(SessionCommand::Disconnect).await?
    }

    /// Queues a text message for reliable delivery.
    pub async fn send_message(&self, content: impl Into<String>) -> Result<MessageId, TetherError> {
        self.send(OutboundMessage::text(content)).await
    }

    /// Queues an arbitrary message for reliable delivery.
    pub async fn send(&self, message: OutboundMessage) -> Result<MessageId, TetherError> {
        self.request(|reply| SessionCommand::Send { message, reply })
            .await?
    }

    /// Flushes the queue now. A no-op unless connected.
    pub async fn flush(&self) -> Result<usize, TetherError> {
        self.request(SessionCommand::Flush).await
    }

    pub async fn metrics_snapshot(&self) -> Result<ConnectionMetrics, TetherError> {
        self.request(SessionCommand::MetricsSnapshot).await
    }

    pub async fn merged_timeline(&self) -> Result<MergedTimeline, TetherError> {
        self.request(SessionCommand::MergedTimeline).await
    }

    /// Fetches a conversation's history and merges it into the timeline.
    ///
    /// The fetch runs on the caller's task; only the merge goes through the actor.
    pub async fn load_history(
        &self,
        conversation: &ConversationId,
    ) -> Result<MergedTimeline, TetherError> {
        let loader = self
            .history
            .as_ref()
            .ok_or_else(|| TetherError::Config("no history source configured".to_string()))?;
        let pages = loader.load(conversation).await?;
        self.request(|reply| SessionCommand::HistoryLoaded { pages, reply })
            .await
    }

    /// Subscribes to every session event published from now on.
    pub async fn subscribe(&self) -> Result<Subscription, TetherError> {
        self.request(SessionCommand::Subscribe).await
    }

    /// Messages that exhausted their retries.
    pub async fn failed_messages(&self) -> Result<Vec<QueueItem>, TetherError> {
        self.request(SessionCommand::FailedMessages).await
    }

    /// Removes and returns every failed message.
    pub async fn take_failed_messages(&self) -> Result<Vec<QueueItem>, TetherError> {
        self.request(SessionCommand::TakeFailed).await
    }

    /// Re-enqueues a failed message. Returns `false` if `id` is not a failed message.
    pub async fn retry_failed(&self, id: &MessageId) -> Result<bool, TetherError> {
        let id = id.clone();
        self.request(|reply| SessionCommand::RetryFailed { id, reply })
            .await?
    }

    /// Disconnects, resets metrics and stops the actor.
    pub async fn shutdown(&self) -> Result<(), TetherError> {
        self.request(SessionCommand::Shutdown).await
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, TetherError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| TetherError::SessionClosed)?;
        rx.await.map_err(|_| TetherError::SessionClosed)
    }
}
