// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session testing.
//!
//! `SessionHarness` spawns a real session actor wired to a [`MockTransport`]
//! and a [`MockHistory`], subscribed to the session's event bus from the
//! start. Jitter is disabled so timings are deterministic under paused time.

use std::sync::Arc;
use std::time::Duration;

use tether_bus::{BusEnvelope, SessionEvent, Subscription};
use tether_core::{ConnectionState, SessionId, StateTransition, TetherError};
use tether_queue::QueueLimits;
use tether_resilience::BackoffPolicy;
use tether_session::{SessionBuilder, SessionHandle, SessionSettings};

use crate::mock_history::MockHistory;
use crate::mock_transport::MockTransport;

/// Builder for creating session test environments.
pub struct SessionHarnessBuilder {
    settings: SessionSettings,
    transport: MockTransport,
    history: MockHistory,
}

impl SessionHarnessBuilder {
    fn new() -> Self {
        let defaults = SessionSettings::default();
        Self {
            settings: SessionSettings {
                backoff: defaults.backoff.clone().without_jitter(),
                ..defaults
            },
            transport: MockTransport::new(),
            history: MockHistory::new(),
        }
    }

    pub fn with_transport(mut self, transport: MockTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_history(mut self, history: MockHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.settings.heartbeat_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Jitter-free backoff.
    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        self.settings.backoff = BackoffPolicy {
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
            max_retries,
        };
        self
    }

    /// Ack timeout doubles as the resend sweep period.
    pub fn with_queue(
        mut self,
        ack_timeout: Duration,
        max_retries: u32,
        max_queue_size: Option<usize>,
    ) -> Self {
        self.settings.queue = QueueLimits {
            ack_timeout,
            max_retries,
            max_queue_size,
        };
        self.settings.flush_interval = ack_timeout;
        self
    }

    /// Spawns the session and subscribes to its events.
    pub async fn build(self) -> Result<SessionHarness, TetherError> {
        let transport = Arc::new(self.transport);
        let history = Arc::new(self.history);
        let handle = SessionBuilder::new(transport.clone())
            .with_settings(self.settings.clone())
            .with_history(history.clone())
            .with_session_id(SessionId("test-session".to_string()))
            .spawn();
        let events = handle.subscribe().await?;

        Ok(SessionHarness {
            handle,
            transport,
            history,
            events,
            settings: self.settings,
        })
    }
}

/// A running session plus its mocks and event subscription.
pub struct SessionHarness {
    pub handle: SessionHandle,
    pub transport: Arc<MockTransport>,
    pub history: Arc<MockHistory>,
    pub events: Subscription,
    settings: SessionSettings,
}

impl SessionHarness {
    pub fn builder() -> SessionHarnessBuilder {
        SessionHarnessBuilder::new()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Connects and waits until the session reports `connected`.
    pub async fn connect(&self) -> Result<(), TetherError> {
        self.handle.connect().await?;
        self.handle
            .wait_for_state(ConnectionState::Connected, self.settings.connect_timeout * 2)
            .await
    }

    /// Waits for the next event; `None` once the session is gone.
    pub async fn next_event(&mut self) -> Option<BusEnvelope> {
        self.events.recv().await
    }

    /// Every event already delivered, without waiting.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            events.push(envelope.event);
        }
        events
    }

    /// The transitions among the already delivered events.
    pub fn drain_transitions(&mut self) -> Vec<StateTransition> {
        self.drain_events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Transition(transition) => Some(transition),
                _ => None,
            })
            .collect()
    }

    /// Lets the actor and transport tasks run without advancing paused time.
    pub async fn settle(&self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        // A round trip through the mailbox guarantees queued commands are done.
        let _ = self.handle.metrics_snapshot().await;
    }

    /// Stops the session.
    pub async fn shutdown(self) -> Result<(), TetherError> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn harness_connects_and_reports_transitions() {
        let mut harness = SessionHarness::builder().build().await.unwrap();
        harness.connect().await.unwrap();
        harness.settle().await;

        let states: Vec<_> = harness
            .drain_transitions()
            .into_iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(
            states,
            vec![
                (ConnectionState::Initial, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Connected),
            ]
        );
        assert_eq!(harness.transport.open_count().await, 1);
        harness.shutdown().await.unwrap();
    }
}
