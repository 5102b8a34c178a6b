// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session metrics aggregation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use tether_bus::SessionEvent;
use tether_core::{ConnectionState, ErrorRecord, StateTransition};

use crate::recording;

/// Read-only snapshot of a session's connection health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    pub last_connected: Option<DateTime<Utc>>,
    /// Entries into `reconnecting` or `error` since the session was created.
    pub reconnect_attempts: u32,
    pub last_error: Option<ErrorRecord>,
    /// Send attempts, resends included.
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_acked: u64,
    pub messages_failed: u64,
    pub messages_dropped: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Round-trip time of the latest acknowledged heartbeat probe.
    pub latency: Option<Duration>,
    /// Total time spent `connected`.
    pub uptime: Duration,
    pub state: ConnectionState,
}

/// Folds session events into [`ConnectionMetrics`].
///
/// Holds no handle to the state machine or the queue; it only sees events.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: ConnectionMetrics,
    connected_since: Option<Instant>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches a bus event to the matching `on_*` hook.
    pub fn observe(&mut self, event: &SessionEvent, now: Instant) {
        match event {
            SessionEvent::Transition(transition) => self.on_state_change(transition, now),
            SessionEvent::MessageSent { attempt, .. } => self.on_message_sent(*attempt),
            SessionEvent::MessageAcked { .. } => self.on_message_acked(),
            SessionEvent::MessageFailed { error, .. } => self.on_message_failed(error),
            SessionEvent::MessageDropped { .. } => self.on_message_dropped(),
            SessionEvent::MessageReceived { .. } => self.on_message_received(),
            SessionEvent::HeartbeatSent { .. } => self.on_heartbeat_sent(),
            SessionEvent::HeartbeatReceived => self.on_heartbeat(Utc::now()),
            SessionEvent::HeartbeatAcked { rtt, .. } => self.on_heartbeat_ack(*rtt, Utc::now()),
            SessionEvent::ConnectionError(record) => self.on_error(record),
            SessionEvent::MessageQueued { .. }
            | SessionEvent::RetryScheduled { .. }
            | SessionEvent::TimelineUpdated { .. } => {}
        }
    }

    pub fn on_state_change(&mut self, transition: &StateTransition, now: Instant) {
        recording::record_transition(transition.to);

        if transition.from == ConnectionState::Connected && transition.to != ConnectionState::Connected {
            self.close_uptime(now);
        }
        match transition.to {
            ConnectionState::Connected => {
                self.metrics.last_connected = Some(transition.at);
                if self.connected_since.is_none() {
                    self.connected_since = Some(now);
                    recording::session_connected();
                }
            }
            ConnectionState::Reconnecting | ConnectionState::Error => {
                self.metrics.reconnect_attempts += 1;
                recording::record_reconnect_attempt();
            }
            _ => {}
        }
        self.metrics.state = transition.to;
    }

    pub fn on_message_sent(&mut self, attempt: u32) {
        self.metrics.messages_sent += 1;
        recording::record_message_sent(attempt);
    }

    pub fn on_message_received(&mut self) {
        self.metrics.messages_received += 1;
        recording::record_message_received();
    }

    pub fn on_message_acked(&mut self) {
        self.metrics.messages_acked += 1;
        recording::record_message_acked();
    }

    pub fn on_message_failed(&mut self, error: &ErrorRecord) {
        self.metrics.messages_failed += 1;
        recording::record_message_failed();
        self.on_error(error);
    }

    pub fn on_message_dropped(&mut self) {
        self.metrics.messages_dropped += 1;
        recording::record_message_dropped();
    }

    pub fn on_heartbeat_sent(&mut self) {
        recording::record_heartbeat_sent();
    }

    /// Inbound heartbeat traffic.
    pub fn on_heartbeat(&mut self, at: DateTime<Utc>) {
        self.metrics.last_heartbeat = Some(at);
        recording::record_heartbeat_received();
    }

    /// A heartbeat probe was acknowledged after `rtt`.
    pub fn on_heartbeat_ack(&mut self, rtt: Duration, at: DateTime<Utc>) {
        self.metrics.latency = Some(rtt);
        self.metrics.last_heartbeat = Some(at);
        recording::record_latency(rtt);
    }

    pub fn on_error(&mut self, error: &ErrorRecord) {
        self.metrics.last_error = Some(error.clone());
        recording::record_error(error.kind);
    }

    /// Current metrics with uptime counted up to `now`.
    pub fn snapshot(&self, now: Instant) -> ConnectionMetrics {
        let mut snapshot = self.metrics.clone();
        if let Some(since) = self.connected_since {
            snapshot.uptime += now.saturating_duration_since(since);
        }
        snapshot
    }

    /// Clears everything. Only called on session teardown.
    pub fn reset(&mut self) {
        if self.connected_since.take().is_some() {
            recording::session_disconnected();
        }
        self.metrics = ConnectionMetrics::default();
    }

    fn close_uptime(&mut self, now: Instant) {
        if let Some(since) = self.connected_since.take() {
            self.metrics.uptime += now.saturating_duration_since(since);
            recording::session_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{ErrorKind, MessageId, TetherError, TransitionCause};

    fn transition(from: ConnectionState, to: ConnectionState) -> StateTransition {
        StateTransition {
            from,
            to,
            cause: TransitionCause::ConnectRequested,
            at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_accumulates_only_while_connected() {
        let mut agg = MetricsAggregator::new();
        let t0 = Instant::now();
        agg.on_state_change(&transition(ConnectionState::Initial, ConnectionState::Connecting), t0);
        agg.on_state_change(
            &transition(ConnectionState::Connecting, ConnectionState::Connected),
            t0 + Duration::from_secs(1),
        );
        assert_eq!(agg.snapshot(t0 + Duration::from_secs(4)).uptime, Duration::from_secs(3));

        agg.on_state_change(
            &transition(ConnectionState::Connected, ConnectionState::Reconnecting),
            t0 + Duration::from_secs(6),
        );
        let snap = agg.snapshot(t0 + Duration::from_secs(60));
        assert_eq!(snap.uptime, Duration::from_secs(5));
        assert_eq!(snap.reconnect_attempts, 1);
        assert_eq!(snap.state, ConnectionState::Reconnecting);
        assert!(snap.last_connected.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn observes_message_events() {
        let mut agg = MetricsAggregator::new();
        let now = Instant::now();
        let id = MessageId::from("m1");
        let err = TetherError::message_undelivered(id.clone(), 3);

        agg.observe(&SessionEvent::MessageSent { id: id.clone(), attempt: 1 }, now);
        agg.observe(&SessionEvent::MessageSent { id: id.clone(), attempt: 2 }, now);
        agg.observe(&SessionEvent::MessageAcked { id: id.clone() }, now);
        agg.observe(
            &SessionEvent::MessageReceived {
                id: id.clone(),
                message_type: tether_core::MessageType::Text,
            },
            now,
        );
        agg.observe(&SessionEvent::MessageDropped { id: id.clone() }, now);
        agg.observe(
            &SessionEvent::MessageFailed {
                id,
                attempts: 3,
                error: ErrorRecord::new(&err, Utc::now()),
            },
            now,
        );

        let snap = agg.snapshot(now);
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.messages_acked, 1);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.messages_dropped, 1);
        assert_eq!(snap.messages_failed, 1);
        assert_eq!(snap.last_error.unwrap().kind, ErrorKind::Message);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ack_sets_latency() {
        let mut agg = MetricsAggregator::new();
        let now = Instant::now();
        agg.observe(
            &SessionEvent::HeartbeatAcked {
                id: MessageId::from("hb"),
                rtt: Duration::from_millis(42),
            },
            now,
        );
        let snap = agg.snapshot(now);
        assert_eq!(snap.latency, Some(Duration::from_millis(42)));
        assert!(snap.last_heartbeat.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_everything() {
        let mut agg = MetricsAggregator::new();
        let now = Instant::now();
        agg.on_state_change(&transition(ConnectionState::Connecting, ConnectionState::Connected), now);
        agg.on_message_sent(1);
        agg.reset();
        assert_eq!(agg.snapshot(now + Duration::from_secs(10)), ConnectionMetrics::default());
    }
}
