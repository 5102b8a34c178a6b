// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backoff controller: attempt accounting and the session's retry timer.
//!
//! The controller is owned by the session actor. Retry timers run as tokio
//! tasks that report back by sending their generation on the fire channel;
//! the actor hands every fire to [`BackoffController::accept_fire`], which
//! rejects fires from timers that were cancelled or replaced in the meantime.
//! A cancelled timer therefore can never produce a retry, even if its task
//! had already queued the fire before the cancellation.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::{ConnectionState, StateTransition, TransitionCause};

use crate::policy::BackoffPolicy;

/// What the session should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// A retry timer was started.
    Schedule { attempt: u32, delay: Duration },
    /// The retry budget is spent; drive the state machine to `failed`.
    Exhausted { attempts: u32 },
    /// A pending retry was cancelled.
    Cancelled,
    /// Nothing to do.
    None,
}

#[derive(Debug)]
struct PendingRetry {
    generation: u64,
    token: CancellationToken,
}

/// Counts reconnect attempts and owns at most one pending retry timer.
#[derive(Debug)]
pub struct BackoffController {
    policy: BackoffPolicy,
    attempt: u32,
    generation: u64,
    pending: Option<PendingRetry>,
    fires: mpsc::UnboundedSender<u64>,
    rng: StdRng,
}

impl BackoffController {
    /// Creates a controller whose timers report on `fires`.
    pub fn new(policy: BackoffPolicy, fires: mpsc::UnboundedSender<u64>) -> Self {
        Self::with_rng(policy, fires, StdRng::from_entropy())
    }

    /// Creates a controller with a caller-supplied jitter source.
    pub fn with_rng(policy: BackoffPolicy, fires: mpsc::UnboundedSender<u64>, rng: StdRng) -> Self {
        Self {
            policy,
            attempt: 0,
            generation: 0,
            pending: None,
            fires,
            rng,
        }
    }

    /// Attempts made since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether a retry timer is armed.
    pub fn has_pending_retry(&self) -> bool {
        self.pending.is_some()
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Reacts to a state machine transition.
    ///
    /// Entering `reconnecting` or `error` (including a re-entry after a failed
    /// retry) counts an attempt and arms a timer, or reports exhaustion once
    /// the attempt count passes `max_retries`. `connected` resets the count.
    /// `connected`, `disconnected` and `failed` cancel any pending retry, as
    /// does an explicit connect request, which also starts a fresh budget.
    pub fn on_state_change(&mut self, transition: &StateTransition) -> BackoffDecision {
        match transition.to {
            ConnectionState::Reconnecting | ConnectionState::Error => {
                self.attempt = self.attempt.saturating_add(1);
                if self.policy.is_exhausted(self.attempt) {
                    self.cancel_pending_retry();
                    warn!(
                        attempts = self.attempt,
                        max_retries = self.policy.max_retries,
                        "reconnect attempts exhausted"
                    );
                    return BackoffDecision::Exhausted {
                        attempts: self.attempt,
                    };
                }
                let delay = self.policy.delay(self.attempt - 1, &mut self.rng);
                self.schedule_retry(delay);
                BackoffDecision::Schedule {
                    attempt: self.attempt,
                    delay,
                }
            }
            ConnectionState::Connected => {
                if self.attempt > 0 {
                    info!(attempts = self.attempt, "reconnected; backoff reset");
                }
                self.attempt = 0;
                self.cancelled_decision()
            }
            ConnectionState::Disconnected | ConnectionState::Failed => self.cancelled_decision(),
            ConnectionState::Connecting
                if transition.cause == TransitionCause::ConnectRequested =>
            {
                self.attempt = 0;
                self.cancelled_decision()
            }
            ConnectionState::Connecting | ConnectionState::Initial => BackoffDecision::None,
        }
    }

    /// Arms a retry timer for `delay`, replacing any pending one. Returns its generation.
    pub fn schedule_retry(&mut self, delay: Duration) -> u64 {
        self.cancel_pending_retry();
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();

        let task_token = token.clone();
        let fires = self.fires.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = fires.send(generation);
                }
            }
        });

        debug!(
            generation,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        self.pending = Some(PendingRetry { generation, token });
        generation
    }

    /// Cancels the pending retry, if any. Returns whether one was pending.
    pub fn cancel_pending_retry(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.token.cancel();
                debug!(generation = pending.generation, "pending retry cancelled");
                true
            }
            None => false,
        }
    }

    /// Accepts a timer fire if it belongs to the currently pending retry.
    pub fn accept_fire(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => {
                debug!(generation, "ignoring stale retry fire");
                false
            }
        }
    }

    fn cancelled_decision(&mut self) -> BackoffDecision {
        if self.cancel_pending_retry() {
            BackoffDecision::Cancelled
        } else {
            BackoffDecision::None
        }
    }
}

impl Drop for BackoffController {
    fn drop(&mut self) {
        self.cancel_pending_retry();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn transition(from: ConnectionState, to: ConnectionState, cause: TransitionCause) -> StateTransition {
        StateTransition {
            from,
            to,
            cause,
            at: Utc::now(),
        }
    }

    fn drop_to_reconnecting() -> StateTransition {
        transition(
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            TransitionCause::HeartbeatTimeout,
        )
    }

    fn reentry() -> StateTransition {
        transition(
            ConnectionState::Reconnecting,
            ConnectionState::Reconnecting,
            TransitionCause::TransportClosed { clean: false },
        )
    }

    fn controller(max_retries: u32) -> (BackoffController, mpsc::UnboundedReceiver<u64>) {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            jitter: Duration::ZERO,
            max_retries,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        (BackoffController::with_rng(policy, tx, StdRng::seed_from_u64(1)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_across_failed_retries() {
        let (mut ctl, _rx) = controller(10);
        let mut delays = Vec::new();
        for t in [drop_to_reconnecting(), reentry(), reentry(), reentry(), reentry()] {
            match ctl.on_state_change(&t) {
                BackoffDecision::Schedule { delay, .. } => delays.push(delay.as_secs()),
                other => panic!("unexpected decision {other:?}"),
            }
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 8]);
        assert_eq!(ctl.attempt(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_resets_attempts() {
        let (mut ctl, _rx) = controller(10);
        ctl.on_state_change(&drop_to_reconnecting());
        ctl.on_state_change(&reentry());
        assert_eq!(ctl.attempt(), 2);

        let decision = ctl.on_state_change(&transition(
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
            TransitionCause::TransportOpened,
        ));
        assert_eq!(decision, BackoffDecision::Cancelled);
        assert_eq!(ctl.attempt(), 0);

        match ctl.on_state_change(&drop_to_reconnecting()) {
            BackoffDecision::Schedule { attempt, delay } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(1));
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries() {
        let (mut ctl, _rx) = controller(2);
        assert!(matches!(
            ctl.on_state_change(&drop_to_reconnecting()),
            BackoffDecision::Schedule { attempt: 1, .. }
        ));
        assert!(matches!(
            ctl.on_state_change(&reentry()),
            BackoffDecision::Schedule { attempt: 2, .. }
        ));
        assert_eq!(
            ctl.on_state_change(&reentry()),
            BackoffDecision::Exhausted { attempts: 3 }
        );
        assert!(!ctl.has_pending_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_with_current_generation() {
        let (mut ctl, mut rx) = controller(5);
        ctl.on_state_change(&drop_to_reconnecting());

        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let generation = rx.recv().await.expect("timer should fire");
        assert!(ctl.accept_fire(generation));
        assert!(!ctl.has_pending_retry());
        // A second delivery of the same fire is ignored.
        assert!(!ctl.accept_fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_retry() {
        let (mut ctl, mut rx) = controller(5);
        ctl.on_state_change(&drop_to_reconnecting());
        let decision = ctl.on_state_change(&transition(
            ConnectionState::Reconnecting,
            ConnectionState::Disconnected,
            TransitionCause::DisconnectRequested,
        ));
        assert_eq!(decision, BackoffDecision::Cancelled);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err(), "cancelled timer must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fire_after_reschedule_is_rejected() {
        let (mut ctl, _rx) = controller(5);
        let first = ctl.schedule_retry(Duration::from_secs(1));
        let second = ctl.schedule_retry(Duration::from_secs(1));
        assert_ne!(first, second);
        assert!(!ctl.accept_fire(first));
        assert!(ctl.accept_fire(second));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_connect_starts_fresh_budget() {
        let (mut ctl, _rx) = controller(1);
        ctl.on_state_change(&drop_to_reconnecting());
        assert!(matches!(
            ctl.on_state_change(&reentry()),
            BackoffDecision::Exhausted { .. }
        ));

        ctl.on_state_change(&transition(
            ConnectionState::Failed,
            ConnectionState::Connecting,
            TransitionCause::ConnectRequested,
        ));
        assert_eq!(ctl.attempt(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_into_connecting_keeps_attempts() {
        let (mut ctl, _rx) = controller(5);
        ctl.on_state_change(&transition(
            ConnectionState::Connecting,
            ConnectionState::Error,
            TransitionCause::TransportError {
                kind: tether_core::ErrorKind::Connection,
            },
        ));
        let decision = ctl.on_state_change(&transition(
            ConnectionState::Error,
            ConnectionState::Connecting,
            TransitionCause::RetryScheduled,
        ));
        assert_eq!(decision, BackoffDecision::None);
        assert_eq!(ctl.attempt(), 1);
    }
}
