// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic session tests.
//!
//! `MockTransport` implements `Transport` with scripted open outcomes,
//! captured sends, optional automatic acks, and injection of inbound events.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tether_core::{
    AdapterType, Frame, HealthStatus, MessageId, OutboundMessage, PluginAdapter, TetherError,
    Transport, TransportEvent, TransportEvents,
};

/// How a call to `open()` resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The connection is established.
    Accept,
    /// The open fails with a connection error.
    Fail(String),
    /// The handshake rejects the credential.
    RejectAuth(String),
    /// The open never resolves.
    Hang,
}

#[derive(Debug)]
struct Inner {
    script: VecDeque<OpenOutcome>,
    fallback: OpenOutcome,
    events: Option<TransportEvents>,
    sent: Vec<OutboundMessage>,
    opens: usize,
    closes: usize,
    auto_ack: bool,
    answer_heartbeats: bool,
    fail_sends: bool,
}

/// A scriptable in-memory transport.
#[derive(Debug)]
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    /// A transport whose opens all succeed and which never acks.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                script: VecDeque::new(),
                fallback: OpenOutcome::Accept,
                events: None,
                sent: Vec::new(),
                opens: 0,
                closes: 0,
                auto_ack: false,
                answer_heartbeats: false,
                fail_sends: false,
            }),
        }
    }

    /// Outcomes for the next opens, in order; later opens use the fallback.
    pub fn with_open_script(mut self, script: Vec<OpenOutcome>) -> Self {
        self.inner.get_mut().script = script.into();
        self
    }

    /// Outcome of every open once the script is used up.
    pub fn with_fallback(mut self, outcome: OpenOutcome) -> Self {
        self.inner.get_mut().fallback = outcome;
        self
    }

    /// Ack every non-heartbeat message as soon as it is sent.
    pub fn with_auto_ack(mut self) -> Self {
        self.inner.get_mut().auto_ack = true;
        self
    }

    /// Ack every heartbeat probe as soon as it is sent.
    pub fn with_heartbeat_answers(mut self) -> Self {
        self.inner.get_mut().answer_heartbeats = true;
        self
    }

    pub async fn set_auto_ack(&self, enabled: bool) {
        self.inner.lock().await.auto_ack = enabled;
    }

    pub async fn set_fallback(&self, outcome: OpenOutcome) {
        self.inner.lock().await.fallback = outcome;
    }

    pub async fn set_fail_sends(&self, enabled: bool) {
        self.inner.lock().await.fail_sends = enabled;
    }

    /// Everything passed to `send()`, heartbeats included.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.inner.lock().await.sent.clone()
    }

    /// Sent messages other than heartbeat probes.
    pub async fn sent_data(&self) -> Vec<OutboundMessage> {
        self.inner
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| !m.is_heartbeat())
            .cloned()
            .collect()
    }

    pub async fn heartbeats_sent(&self) -> usize {
        self.inner
            .lock()
            .await
            .sent
            .iter()
            .filter(|m| m.is_heartbeat())
            .count()
    }

    pub async fn open_count(&self) -> usize {
        self.inner.lock().await.opens
    }

    pub async fn close_count(&self) -> usize {
        self.inner.lock().await.closes
    }

    /// Whether a connection is currently open.
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.events.is_some()
    }

    /// Emits `event` on the open connection. Returns `false` if none is open.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        match &self.inner.lock().await.events {
            Some(events) => events.emit(event),
            None => false,
        }
    }

    /// Delivers an inbound frame.
    pub async fn inject_frame(&self, frame: Frame) -> bool {
        self.emit(TransportEvent::Frame(frame)).await
    }

    /// Acknowledges a previously sent message.
    pub async fn ack(&self, id: &MessageId) -> bool {
        self.emit(TransportEvent::Ack {
            message_id: id.clone(),
        })
        .await
    }

    /// Closes the open connection from the remote side.
    pub async fn drop_connection(&self, clean: bool) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.events.take() {
            Some(events) => events.emit(TransportEvent::Closed {
                clean,
                reason: (!clean).then(|| "connection reset by peer".to_string()),
            }),
            None => false,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        self.inner.lock().await.events = None;
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, events: TransportEvents) -> Result<(), TetherError> {
        let outcome = {
            let mut inner = self.inner.lock().await;
            inner.opens += 1;
            let outcome = match inner.script.pop_front() {
                Some(outcome) => outcome,
                None => inner.fallback.clone(),
            };
            if outcome == OpenOutcome::Accept {
                inner.events = Some(events);
            }
            outcome
        };

        match outcome {
            OpenOutcome::Accept => Ok(()),
            OpenOutcome::Fail(message) => Err(TetherError::connection(message)),
            OpenOutcome::RejectAuth(reason) => Err(TetherError::authentication(reason)),
            OpenOutcome::Hang => std::future::pending::<Result<(), TetherError>>().await,
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TetherError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_sends {
            return Err(TetherError::connection("mock send failure"));
        }
        inner.sent.push(message.clone());

        let ack = if message.is_heartbeat() {
            inner.answer_heartbeats
        } else {
            inner.auto_ack
        };
        if ack {
            if let Some(events) = &inner.events {
                events.emit(TransportEvent::Ack {
                    message_id: message.id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TetherError> {
        let mut inner = self.inner.lock().await;
        inner.closes += 1;
        inner.events = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn scripted_opens_then_fallback() {
        let transport = MockTransport::new()
            .with_open_script(vec![
                OpenOutcome::Fail("refused".into()),
                OpenOutcome::RejectAuth("expired".into()),
            ])
            .with_fallback(OpenOutcome::Accept);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = transport.open(TransportEvents::new(1, tx.clone())).await.unwrap_err();
        assert!(matches!(err, TetherError::Connection { .. }));
        let err = transport.open(TransportEvents::new(2, tx.clone())).await.unwrap_err();
        assert!(matches!(err, TetherError::Authentication { .. }));
        transport.open(TransportEvents::new(3, tx)).await.unwrap();
        assert_eq!(transport.open_count().await, 3);
        assert!(transport.is_open().await);
    }

    #[tokio::test]
    async fn auto_ack_emits_on_current_epoch() {
        let transport = MockTransport::new().with_auto_ack();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.open(TransportEvents::new(7, tx)).await.unwrap();

        let msg = OutboundMessage::text("hello");
        transport.send(&msg).await.unwrap();
        let (epoch, event) = rx.recv().await.unwrap();
        assert_eq!(epoch, 7);
        assert_eq!(
            event,
            TransportEvent::Ack {
                message_id: msg.id.clone()
            }
        );

        // Heartbeats are not answered unless asked for.
        transport.send(&OutboundMessage::heartbeat()).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.sent_data().await.len(), 1);
        assert_eq!(transport.heartbeats_sent().await, 1);
    }

    #[tokio::test]
    async fn drop_connection_reports_abnormal_close() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.open(TransportEvents::new(1, tx)).await.unwrap();

        assert!(transport.drop_connection(false).await);
        let (_, event) = rx.recv().await.unwrap();
        assert!(matches!(event, TransportEvent::Closed { clean: false, .. }));
        assert!(!transport.is_open().await);
        assert!(!transport.drop_connection(false).await);
    }
}
