// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event bus for one session.
//!
//! The bus is owned by the session actor, which is its only publisher.
//! Every subscriber gets its own unbounded channel, so events are delivered
//! exactly once and in publish order; a slow subscriber never causes another
//! to miss an event. Subscribers that hang up are pruned on the next publish.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use tether_core::{ErrorRecord, MessageId, MessageType, SessionId, StateTransition};

/// Everything a session reports to its observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The connection state machine changed state.
    Transition(StateTransition),
    /// A message was accepted by the queue.
    MessageQueued { id: MessageId },
    /// A send attempt was handed to the transport.
    MessageSent { id: MessageId, attempt: u32 },
    /// The remote end acknowledged a message.
    MessageAcked { id: MessageId },
    /// A message exhausted its retries and moved to the failed bucket.
    MessageFailed {
        id: MessageId,
        attempts: u32,
        error: ErrorRecord,
    },
    /// A queued message was evicted by the queue-size cap.
    MessageDropped { id: MessageId },
    /// A frame arrived from the transport.
    MessageReceived {
        id: MessageId,
        message_type: MessageType,
    },
    /// A heartbeat probe was sent.
    HeartbeatSent { id: MessageId },
    /// A heartbeat frame arrived from the remote end.
    HeartbeatReceived,
    /// A heartbeat probe was acknowledged.
    HeartbeatAcked { id: MessageId, rtt: Duration },
    /// A reconnect was scheduled by the backoff controller.
    RetryScheduled { attempt: u32, delay: Duration },
    /// A connection-level error was observed.
    ConnectionError(ErrorRecord),
    /// The merged timeline was rebuilt.
    TimelineUpdated { len: usize },
}

impl SessionEvent {
    /// Short name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Transition(_) => "transition",
            SessionEvent::MessageQueued { .. } => "message_queued",
            SessionEvent::MessageSent { .. } => "message_sent",
            SessionEvent::MessageAcked { .. } => "message_acked",
            SessionEvent::MessageFailed { .. } => "message_failed",
            SessionEvent::MessageDropped { .. } => "message_dropped",
            SessionEvent::MessageReceived { .. } => "message_received",
            SessionEvent::HeartbeatSent { .. } => "heartbeat_sent",
            SessionEvent::HeartbeatReceived => "heartbeat_received",
            SessionEvent::HeartbeatAcked { .. } => "heartbeat_acked",
            SessionEvent::RetryScheduled { .. } => "retry_scheduled",
            SessionEvent::ConnectionError(_) => "connection_error",
            SessionEvent::TimelineUpdated { .. } => "timeline_updated",
        }
    }
}

/// An event with its delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEnvelope {
    pub session_id: SessionId,
    /// Monotonic per-session sequence number, starting at 1.
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub event: SessionEvent,
}

/// Receiving half handed to subscribers.
pub type Subscription = mpsc::UnboundedReceiver<BusEnvelope>;

/// Fan-out bus for one session.
#[derive(Debug)]
pub struct EventBus {
    session_id: SessionId,
    sequence: u64,
    subscribers: Vec<mpsc::UnboundedSender<BusEnvelope>>,
}

impl EventBus {
    /// Creates an empty bus for `session_id`.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            sequence: 0,
            subscribers: Vec::new(),
        }
    }

    /// Registers a new subscriber. It receives every event published from now on.
    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Publishes `event` to all live subscribers and returns its sequence number.
    pub fn publish(&mut self, event: SessionEvent) -> u64 {
        self.sequence += 1;
        let envelope = BusEnvelope {
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            at: Utc::now(),
            event,
        };
        trace!(
            session_id = %self.session_id,
            sequence = self.sequence,
            event = envelope.event.name(),
            "publishing session event"
        );
        self.subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        self.sequence
    }

    /// Number of live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drops all subscribers; their receivers see the channel close.
    pub fn close(&mut self) {
        self.subscribers.clear();
    }
}
