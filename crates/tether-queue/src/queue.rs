// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO queue with ack tracking, bounded retries and an optional size cap.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use tether_config::QueueConfig;
use tether_core::{MessageId, OutboundMessage, TetherError};

/// Queue tuning taken from the `[queue]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLimits {
    pub ack_timeout: Duration,
    /// Send attempts allowed per message.
    pub max_retries: u32,
    /// `None` leaves the queue unbounded.
    pub max_queue_size: Option<usize>,
}

impl QueueLimits {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout(),
            max_retries: config.max_retries,
            max_queue_size: config.max_queue_size,
        }
    }
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// One queued message and its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub message: OutboundMessage,
    pub attempts: u32,
    pub last_attempt: Option<Instant>,
    in_flight: bool,
}

impl QueueItem {
    fn new(message: OutboundMessage) -> Self {
        Self {
            message,
            attempts: 0,
            last_attempt: None,
            in_flight: false,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.message.id
    }

    /// Sent on the current connection and awaiting its ack.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn ack_expired(&self, now: Instant, ack_timeout: Duration) -> bool {
        self.last_attempt
            .is_some_and(|at| now.saturating_duration_since(at) >= ack_timeout)
    }
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub id: MessageId,
    /// The oldest unsent item, evicted to make room under `max_queue_size`.
    pub evicted: Option<QueueItem>,
}

/// A send the session must perform.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub message: OutboundMessage,
    /// One-based attempt number of this send.
    pub attempt: u32,
}

/// An item that exhausted its attempts during a flush.
#[derive(Debug)]
pub struct Undelivered {
    pub id: MessageId,
    pub attempts: u32,
    pub error: TetherError,
}

/// Output of [`ReliableQueue::flush`], in queue order.
#[derive(Debug, Default)]
pub struct FlushPlan {
    pub to_send: Vec<Dispatch>,
    pub failed: Vec<Undelivered>,
}

impl FlushPlan {
    pub fn is_empty(&self) -> bool {
        self.to_send.is_empty() && self.failed.is_empty()
    }
}

/// The reliable queue of one session.
#[derive(Debug, Default)]
pub struct ReliableQueue {
    limits: QueueLimits,
    items: VecDeque<QueueItem>,
    failed: Vec<QueueItem>,
}

impl ReliableQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            items: VecDeque::new(),
            failed: Vec::new(),
        }
    }

    pub fn limits(&self) -> &QueueLimits {
        &self.limits
    }

    /// Appends a message. Accepted in every connection state.
    ///
    /// When the cap is reached the oldest item not in flight is evicted and
    /// returned; if every item is in flight the message is rejected instead.
    pub fn enqueue(&mut self, message: OutboundMessage) -> Result<Enqueued, TetherError> {
        let mut evicted = None;
        if let Some(capacity) = self.limits.max_queue_size {
            if self.items.len() >= capacity {
                let Some(pos) = self.items.iter().position(|item| !item.in_flight) else {
                    warn!(capacity, "queue full with every message in flight");
                    return Err(TetherError::QueueFull { capacity });
                };
                let item = self.items.remove(pos);
                if let Some(item) = &item {
                    warn!(message_id = %item.id(), capacity, "queue full; evicted oldest unsent message");
                }
                evicted = item;
            }
        }

        let id = message.id.clone();
        debug!(message_id = %id, queued = self.items.len() + 1, "message enqueued");
        self.items.push_back(QueueItem::new(message));
        Ok(Enqueued { id, evicted })
    }

    /// Removes an acknowledged message. Unknown ids are ignored.
    pub fn on_ack(&mut self, id: &MessageId) -> Option<QueueItem> {
        let pos = self.items.iter().position(|item| item.id() == id)?;
        let item = self.items.remove(pos);
        if let Some(item) = &item {
            debug!(message_id = %id, attempts = item.attempts, "message acknowledged");
        }
        item
    }

    /// Plans the sends due at `now`. A no-op unless `connected`.
    ///
    /// Unsent items are sent in FIFO order. In-flight items whose ack timed out
    /// are resent, or moved to the failed bucket once they have used all
    /// `max_retries` attempts. An item is reported as failed exactly once.
    pub fn flush(&mut self, now: Instant, connected: bool) -> FlushPlan {
        let mut plan = FlushPlan::default();
        if !connected {
            return plan;
        }

        let limits = self.limits.clone();
        let mut kept = VecDeque::with_capacity(self.items.len());
        for mut item in self.items.drain(..) {
            let due = !item.in_flight || item.ack_expired(now, limits.ack_timeout);
            if !due {
                kept.push_back(item);
                continue;
            }

            if item.attempts >= limits.max_retries {
                warn!(
                    message_id = %item.id(),
                    attempts = item.attempts,
                    "message not acknowledged; giving up"
                );
                plan.failed.push(Undelivered {
                    id: item.id().clone(),
                    attempts: item.attempts,
                    error: TetherError::message_undelivered(item.id().clone(), item.attempts),
                });
                item.in_flight = false;
                self.failed.push(item);
                continue;
            }

            item.attempts += 1;
            item.last_attempt = Some(now);
            item.in_flight = true;
            plan.to_send.push(Dispatch {
                message: item.message.clone(),
                attempt: item.attempts,
            });
            kept.push_back(item);
        }
        self.items = kept;
        plan
    }

    /// A new connection is up; nothing sent on the old one is still awaited.
    pub fn on_connected(&mut self) {
        self.clear_in_flight();
    }

    /// The connection dropped. Unacked items keep their attempt counts and are
    /// resent after reconnect; nothing is discarded.
    pub fn on_disconnected(&mut self) {
        self.clear_in_flight();
    }

    fn clear_in_flight(&mut self) {
        for item in &mut self.items {
            item.in_flight = false;
        }
    }

    /// Items that exhausted their attempts, oldest first.
    pub fn failed_items(&self) -> &[QueueItem] {
        &self.failed
    }

    /// Drains the failed bucket, oldest first.
    pub fn take_failed(&mut self) -> Vec<QueueItem> {
        std::mem::take(&mut self.failed)
    }

    /// Manually puts a failed item back at the tail with a fresh attempt budget.
    /// Returns `Ok(None)` when `id` is not in the failed bucket.
    pub fn requeue_failed(&mut self, id: &MessageId) -> Result<Option<Enqueued>, TetherError> {
        let Some(pos) = self.failed.iter().position(|item| item.id() == id) else {
            return Ok(None);
        };
        let item = self.failed.remove(pos);
        match self.enqueue(item.message.clone()) {
            Ok(enqueued) => Ok(Some(enqueued)),
            Err(err) => {
                self.failed.insert(pos, item);
                Err(err)
            }
        }
    }

    /// Items awaiting delivery, in send order.
    pub fn pending(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    pub fn in_flight_count(&self) -> usize {
        self.items.iter().filter(|item| item.in_flight).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
