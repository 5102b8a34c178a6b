// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session actor.
//!
//! Three inputs feed one `select!` loop: the command mailbox, transport
//! events, and backoff timer fires. Heartbeat probes, the heartbeat deadline
//! and the resend sweep are deadlines computed from actor state. Everything is
//! handled serially, so the state machine, backoff controller, queue, metrics
//! and timeline need no locking.
//!
//! Every transport open gets a new epoch. Lifecycle events (`Opened`,
//! `Closed`, `Error`, `AuthenticationRejected`) tagged with an older epoch
//! come from a connection the session has already abandoned and are dropped.
//! Frames and acks are data and are accepted from any epoch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use tether_bus::{EventBus, SessionEvent};
use tether_connection::{ConnectionStateMachine, HeartbeatMonitor};
use tether_core::{
    ConnectionState, ErrorRecord, InboundMessage, MessageId, OutboundMessage, SessionId,
    StateTransition, TetherError, Transport, TransportEvent, TransportEvents,
};
use tether_metrics::MetricsAggregator;
use tether_queue::{Enqueued, ReliableQueue};
use tether_reconcile::Timeline;
use tether_resilience::{BackoffController, BackoffDecision};

use crate::command::SessionCommand;
use crate::settings::SessionSettings;

/// Placeholder wake-up for the timer branch when no deadline is armed.
const IDLE_WAKEUP: Duration = Duration::from_secs(24 * 60 * 60);

enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Default)]
struct Timers {
    next_probe: Option<Instant>,
    next_flush: Option<Instant>,
}

/// Single writer for one session's connection lifecycle and delivery state.
pub struct SessionActor {
    id: SessionId,
    settings: SessionSettings,
    transport: Arc<dyn Transport>,
    machine: ConnectionStateMachine,
    backoff: BackoffController,
    queue: ReliableQueue,
    metrics: MetricsAggregator,
    timeline: Timeline,
    heartbeat: HeartbeatMonitor,
    bus: EventBus,
    state_tx: watch::Sender<ConnectionState>,
    commands: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    events_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    fires: mpsc::UnboundedReceiver<u64>,
    epoch: u64,
    open_cancel: Option<CancellationToken>,
    timers: Timers,
}

impl SessionActor {
    pub(crate) fn new(
        id: SessionId,
        settings: SessionSettings,
        transport: Arc<dyn Transport>,
        commands: mpsc::Receiver<SessionCommand>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fires_tx, fires) = mpsc::unbounded_channel();
        Self {
            backoff: BackoffController::new(settings.backoff.clone(), fires_tx),
            queue: ReliableQueue::new(settings.queue.clone()),
            heartbeat: HeartbeatMonitor::new(settings.heartbeat_interval),
            bus: EventBus::new(id.clone()),
            machine: ConnectionStateMachine::new(),
            metrics: MetricsAggregator::new(),
            timeline: Timeline::new(),
            id,
            settings,
            transport,
            state_tx,
            commands,
            events_tx,
            events_rx,
            fires,
            epoch: 0,
            open_cancel: None,
            timers: Timers::default(),
        }
    }

    /// Runs until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            session_id = %self.id,
            transport = self.transport.name(),
            "session started"
        );

        loop {
            let deadline = self.next_deadline();
            let wake_at = deadline.unwrap_or_else(|| Instant::now() + IDLE_WAKEUP);

            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!(session_id = %self.id, "all session handles dropped");
                        self.teardown().await;
                        break;
                    };
                    if let Flow::Stop = self.handle_command(command).await {
                        break;
                    }
                }
                Some((epoch, event)) = self.events_rx.recv() => {
                    self.handle_transport_event(epoch, event).await;
                }
                Some(generation) = self.fires.recv() => {
                    self.handle_retry_fire(generation).await;
                }
                () = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                    self.handle_timers().await;
                }
            }
        }

        info!(session_id = %self.id, "session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            SessionCommand::Disconnect(reply) => {
                let result = self.disconnect().await;
                let _ = reply.send(result);
            }
            SessionCommand::Send { message, reply } => {
                let result = self.enqueue(message).await;
                let _ = reply.send(result);
            }
            SessionCommand::Flush(reply) => {
                let sent = self.flush_queue().await;
                let _ = reply.send(sent);
            }
            SessionCommand::MetricsSnapshot(reply) => {
                let _ = reply.send(self.metrics.snapshot(Instant::now()));
            }
            SessionCommand::MergedTimeline(reply) => {
                let _ = reply.send(self.timeline.merged().clone());
            }
            SessionCommand::HistoryLoaded { pages, reply } => {
                let len = self.timeline.replace_history(pages).len();
                self.publish(SessionEvent::TimelineUpdated { len });
                let _ = reply.send(self.timeline.merged().clone());
            }
            SessionCommand::Subscribe(reply) => {
                let _ = reply.send(self.bus.subscribe());
            }
            SessionCommand::FailedMessages(reply) => {
                let _ = reply.send(self.queue.failed_items().to_vec());
            }
            SessionCommand::TakeFailed(reply) => {
                let _ = reply.send(self.queue.take_failed());
            }
            SessionCommand::RetryFailed { id, reply } => {
                let result = self.retry_failed(&id).await;
                let _ = reply.send(result);
            }
            SessionCommand::Shutdown(reply) => {
                self.teardown().await;
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // --- Commands ---

    async fn connect(&mut self) -> Result<(), TetherError> {
        if let Some(transition) = self.machine.connect()? {
            self.apply(transition).await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TetherError> {
        if let Some(transition) = self.machine.disconnect()? {
            self.apply(transition).await;
        }
        Ok(())
    }

    async fn enqueue(&mut self, message: OutboundMessage) -> Result<MessageId, TetherError> {
        let enqueued = self.queue.enqueue(message)?;
        let id = self.accept_enqueued(enqueued);
        self.flush_if_connected().await;
        Ok(id)
    }

    async fn retry_failed(&mut self, id: &MessageId) -> Result<bool, TetherError> {
        let Some(enqueued) = self.queue.requeue_failed(id)? else {
            return Ok(false);
        };
        info!(session_id = %self.id, message_id = %id, "failed message requeued");
        self.accept_enqueued(enqueued);
        self.flush_if_connected().await;
        Ok(true)
    }

    fn accept_enqueued(&mut self, enqueued: Enqueued) -> MessageId {
        if let Some(evicted) = enqueued.evicted {
            self.publish(SessionEvent::MessageDropped {
                id: evicted.id().clone(),
            });
        }
        self.publish(SessionEvent::MessageQueued {
            id: enqueued.id.clone(),
        });
        enqueued.id
    }

    async fn teardown(&mut self) {
        if let Err(err) = self.disconnect().await {
            warn!(session_id = %self.id, error = %err, "disconnect during teardown failed");
        }
        self.backoff.cancel_pending_retry();
        if let Err(err) = self.transport.shutdown().await {
            warn!(session_id = %self.id, error = %err, "transport shutdown failed");
        }
        self.metrics.reset();
        self.bus.close();
    }

    // --- Transitions ---

    /// Applies a transition and everything it implies, including any
    /// follow-up transition (retry exhaustion drives `failed`).
    async fn apply(&mut self, first: StateTransition) {
        let mut pending = Some(first);
        while let Some(transition) = pending.take() {
            let now = Instant::now();
            self.state_tx.send_replace(transition.to);
            self.publish(SessionEvent::Transition(transition.clone()));

            if transition.from == ConnectionState::Connected
                && transition.to != ConnectionState::Connected
            {
                self.heartbeat.stop();
                self.timers = Timers::default();
                self.queue.on_disconnected();
            }

            match transition.to {
                ConnectionState::Connecting => self.start_open(),
                ConnectionState::Connected => {
                    self.open_cancel = None;
                    self.heartbeat.start(now);
                    self.timers.next_probe = Some(now + self.settings.heartbeat_interval);
                    self.timers.next_flush = Some(now + self.settings.flush_interval);
                    self.queue.on_connected();
                }
                ConnectionState::Disconnected
                | ConnectionState::Reconnecting
                | ConnectionState::Error
                | ConnectionState::Failed => self.abandon_transport().await,
                ConnectionState::Initial => {}
            }

            match self.backoff.on_state_change(&transition) {
                BackoffDecision::Schedule { attempt, delay } => {
                    info!(
                        session_id = %self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect scheduled"
                    );
                    self.publish(SessionEvent::RetryScheduled { attempt, delay });
                }
                BackoffDecision::Exhausted { attempts } => {
                    warn!(session_id = %self.id, attempts, "giving up on reconnecting");
                    match self.machine.on_retry_exhausted() {
                        Ok(next) => pending = next,
                        Err(err) => warn!(session_id = %self.id, error = %err, "retry exhaustion rejected"),
                    }
                }
                BackoffDecision::Cancelled | BackoffDecision::None => {}
            }

            if transition.to == ConnectionState::Connected {
                self.flush_queue().await;
            }
        }
    }

    /// Opens the transport under a fresh epoch. The open runs as its own task
    /// so the actor keeps serving commands, bounded by `connect_timeout`.
    fn start_open(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        let events = TransportEvents::new(epoch, self.events_tx.clone());
        let transport = Arc::clone(&self.transport);
        let connect_timeout = self.settings.connect_timeout;
        let token = CancellationToken::new();
        if let Some(previous) = self.open_cancel.replace(token.clone()) {
            previous.cancel();
        }

        debug!(session_id = %self.id, epoch, "opening transport");
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => return,
                result = tokio::time::timeout(connect_timeout, transport.open(events.clone())) => result,
            };
            let event = match outcome {
                Ok(Ok(())) => TransportEvent::Opened,
                Ok(Err(err)) => TransportEvent::from_open_error(&err),
                Err(_) => TransportEvent::Error {
                    message: format!("transport open timed out after {connect_timeout:?}"),
                },
            };
            events.emit(event);
        });
    }

    /// Drops the current connection: later lifecycle events from it are stale.
    async fn abandon_transport(&mut self) {
        self.epoch += 1;
        if let Some(token) = self.open_cancel.take() {
            token.cancel();
        }
        match tokio::time::timeout(self.settings.connect_timeout, self.transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(session_id = %self.id, error = %err, "transport close failed"),
            Err(_) => warn!(session_id = %self.id, "transport close timed out"),
        }
    }

    // --- Transport events ---

    async fn handle_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        let now = Instant::now();
        match event {
            TransportEvent::Frame(frame) => self.on_frame(&frame, now),
            TransportEvent::Ack { message_id } => self.on_ack(message_id, now),
            lifecycle => {
                if epoch != self.epoch {
                    trace!(session_id = %self.id, epoch, current = self.epoch, "dropping stale transport event");
                    return;
                }
                self.record_transport_error(&lifecycle);
                match self.machine.on_transport_event(&lifecycle) {
                    Ok(Some(transition)) => self.apply(transition).await,
                    Ok(None) => {}
                    Err(err) => debug!(session_id = %self.id, error = %err, "transport event ignored"),
                }
            }
        }
    }

    fn record_transport_error(&mut self, event: &TransportEvent) {
        let err = match event {
            TransportEvent::Error { message } => TetherError::connection(message.clone()),
            TransportEvent::Closed {
                clean: false,
                reason,
            } => TetherError::connection_with_code(
                reason
                    .clone()
                    .unwrap_or_else(|| "connection closed abnormally".to_string()),
                "abnormal_closure",
            ),
            TransportEvent::AuthenticationRejected { reason } => {
                TetherError::authentication(reason.clone())
            }
            _ => return,
        };
        warn!(session_id = %self.id, error = %err, "transport error");
        self.publish(SessionEvent::ConnectionError(ErrorRecord::new(&err, Utc::now())));
    }

    fn on_frame(&mut self, frame: &OutboundMessage, now: Instant) {
        if frame.is_heartbeat() {
            self.heartbeat.record_heartbeat(now);
            self.publish(SessionEvent::HeartbeatReceived);
            return;
        }

        self.publish(SessionEvent::MessageReceived {
            id: frame.id.clone(),
            message_type: frame.message_type,
        });
        let len = self
            .timeline
            .push_live(InboundMessage::from_frame(frame))
            .len();
        self.publish(SessionEvent::TimelineUpdated { len });
    }

    fn on_ack(&mut self, id: MessageId, now: Instant) {
        if let Some(rtt) = self.heartbeat.probe_acked(&id, now) {
            self.publish(SessionEvent::HeartbeatAcked { id, rtt });
            return;
        }
        if self.queue.on_ack(&id).is_some() {
            self.publish(SessionEvent::MessageAcked { id });
        } else {
            trace!(session_id = %self.id, message_id = %id, "ack for unknown message");
        }
    }

    // --- Timers ---

    async fn handle_retry_fire(&mut self, generation: u64) {
        if !self.backoff.accept_fire(generation) {
            return;
        }
        debug!(session_id = %self.id, generation, "retry timer fired");
        match self.machine.on_retry() {
            Ok(Some(transition)) => self.apply(transition).await,
            // Reconnecting: the attempt is an open without a state change.
            Ok(None) => self.start_open(),
            Err(err) => debug!(session_id = %self.id, error = %err, "retry fire ignored"),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let heartbeat = if self.machine.current_state() == ConnectionState::Connected {
            self.heartbeat.deadline()
        } else {
            None
        };
        [heartbeat, self.timers.next_probe, self.timers.next_flush]
            .into_iter()
            .flatten()
            .min()
    }

    async fn handle_timers(&mut self) {
        let now = Instant::now();

        if self.machine.current_state() == ConnectionState::Connected
            && self.heartbeat.is_expired(now)
        {
            let window = self.heartbeat.timeout_window();
            let err = TetherError::connection_with_code(
                format!("no heartbeat for more than {window:?}"),
                "heartbeat_timeout",
            );
            warn!(session_id = %self.id, error = %err, "heartbeat timeout");
            self.publish(SessionEvent::ConnectionError(ErrorRecord::new(&err, Utc::now())));
            match self.machine.on_heartbeat_timeout() {
                Ok(Some(transition)) => self.apply(transition).await,
                Ok(None) => {}
                Err(err) => debug!(session_id = %self.id, error = %err, "heartbeat timeout ignored"),
            }
            return;
        }

        if self.timers.next_probe.is_some_and(|at| at <= now) {
            self.timers.next_probe = Some(now + self.settings.heartbeat_interval);
            self.send_probe(now).await;
        }
        if self.timers.next_flush.is_some_and(|at| at <= now) {
            self.timers.next_flush = Some(now + self.settings.flush_interval);
            self.flush_queue().await;
        }
    }

    async fn send_probe(&mut self, now: Instant) {
        let probe = OutboundMessage::heartbeat();
        let id = probe.id.clone();
        // Registered before sending so an ack emitted during send is matched.
        self.heartbeat.probe_sent(id.clone(), now);
        match self.send_to_transport(&probe).await {
            Ok(()) => self.publish(SessionEvent::HeartbeatSent { id }),
            Err(err) => warn!(session_id = %self.id, error = %err, "heartbeat probe failed"),
        }
    }

    // --- Queue ---

    async fn flush_if_connected(&mut self) {
        if self.machine.current_state() == ConnectionState::Connected {
            self.flush_queue().await;
        }
    }

    /// Carries out one queue flush. Returns the number of successful sends.
    async fn flush_queue(&mut self) -> usize {
        let connected = self.machine.current_state() == ConnectionState::Connected;
        let plan = self.queue.flush(Instant::now(), connected);

        for undelivered in plan.failed {
            warn!(
                session_id = %self.id,
                message_id = %undelivered.id,
                attempts = undelivered.attempts,
                "message delivery failed"
            );
            self.publish(SessionEvent::MessageFailed {
                id: undelivered.id,
                attempts: undelivered.attempts,
                error: ErrorRecord::new(&undelivered.error, Utc::now()),
            });
        }

        let mut sent = 0;
        for dispatch in plan.to_send {
            match self.send_to_transport(&dispatch.message).await {
                Ok(()) => {
                    sent += 1;
                    self.publish(SessionEvent::MessageSent {
                        id: dispatch.message.id.clone(),
                        attempt: dispatch.attempt,
                    });
                }
                Err(err) => warn!(
                    session_id = %self.id,
                    message_id = %dispatch.message.id,
                    attempt = dispatch.attempt,
                    error = %err,
                    "send failed; will retry after the ack timeout"
                ),
            }
        }
        sent
    }

    async fn send_to_transport(&self, message: &OutboundMessage) -> Result<(), TetherError> {
        let limit = self.settings.connect_timeout;
        match tokio::time::timeout(limit, self.transport.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(TetherError::Timeout { duration: limit }),
        }
    }

    /// Metrics observe every event before it reaches subscribers.
    fn publish(&mut self, event: SessionEvent) {
        self.metrics.observe(&event, Instant::now());
        self.bus.publish(event);
    }
}
