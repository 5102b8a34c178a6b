// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state machine.
//!
//! ```text
//! initial ──connect──▶ connecting ──opened──▶ connected ──clean close──▶ disconnected
//!                          │                    │                            │
//!                        error          abnormal close /                  connect
//!                          ▼             heartbeat timeout                    │
//!                        error ◀─┐              ▼                             ▼
//!                          │     │         reconnecting ──opened──▶ connected
//!                  retry / connect          │       ▲
//!                          ▼               │       └── failed retry (re-entry)
//!                      connecting    retry exhausted
//!                                           ▼
//!                                        failed ──connect──▶ connecting
//! ```
//!
//! `disconnect()` moves any live state to `disconnected`; authentication
//! rejection moves straight to `failed`. Inputs a state does not accept are
//! rejected without changing state, so `connected -> connecting` can never happen.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tether_core::{
    ConnectionState, ErrorKind, StateTransition, TetherError, TransitionCause, TransportEvent,
};

use ConnectionState::*;

/// Owns the [`ConnectionState`] of one session.
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    transitions: u64,
    subscribers: Vec<mpsc::UnboundedSender<StateTransition>>,
}

impl ConnectionStateMachine {
    /// A machine in the `initial` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn current_state(&self) -> ConnectionState {
        self.state
    }

    /// Number of transitions applied so far.
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Receives every subsequent transition exactly once, in order.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StateTransition> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Explicit connect. Valid from `initial`, `disconnected`, `error` (manual retry)
    /// and `failed`; a no-op while a connection is live or being opened.
    pub fn connect(&mut self) -> Result<Option<StateTransition>, TetherError> {
        match self.state {
            Initial | Disconnected | Error | Failed => {
                Ok(Some(self.transition(Connecting, TransitionCause::ConnectRequested)))
            }
            Connecting | Connected | Reconnecting => Ok(None),
        }
    }

    /// Explicit disconnect. Reaches `disconnected` exactly once.
    pub fn disconnect(&mut self) -> Result<Option<StateTransition>, TetherError> {
        match self.state {
            Initial | Disconnected => Ok(None),
            _ => Ok(Some(
                self.transition(Disconnected, TransitionCause::DisconnectRequested),
            )),
        }
    }

    /// Applies a transport event. Frames and acks never change state.
    pub fn on_transport_event(
        &mut self,
        event: &TransportEvent,
    ) -> Result<Option<StateTransition>, TetherError> {
        let state = self.state;
        let next = match (event, state) {
            (TransportEvent::Frame(_) | TransportEvent::Ack { .. }, _) => None,

            (TransportEvent::Opened, Connecting | Reconnecting) => {
                Some((Connected, TransitionCause::TransportOpened))
            }
            (TransportEvent::Opened, _) => return Err(self.invalid("transport opened")),

            (TransportEvent::Closed { clean: true, .. }, Connected) => {
                Some((Disconnected, TransitionCause::TransportClosed { clean: true }))
            }
            (TransportEvent::Closed { clean, .. }, Connected | Reconnecting) => {
                Some((Reconnecting, TransitionCause::TransportClosed { clean: *clean }))
            }
            (TransportEvent::Closed { clean, .. }, Connecting) => {
                Some((Error, TransitionCause::TransportClosed { clean: *clean }))
            }
            // Already down: a late close report carries no new information.
            (TransportEvent::Closed { .. }, _) => None,

            (TransportEvent::Error { .. }, Connecting) => Some((
                Error,
                TransitionCause::TransportError {
                    kind: ErrorKind::Connection,
                },
            )),
            (TransportEvent::Error { .. }, Connected | Reconnecting) => Some((
                Reconnecting,
                TransitionCause::TransportError {
                    kind: ErrorKind::Connection,
                },
            )),
            (TransportEvent::Error { .. }, _) => None,

            (TransportEvent::AuthenticationRejected { .. }, Connecting | Connected | Reconnecting) => {
                Some((Failed, TransitionCause::AuthenticationRejected))
            }
            (TransportEvent::AuthenticationRejected { .. }, _) => None,
        };

        Ok(next.map(|(to, cause)| self.transition(to, cause)))
    }

    /// Heartbeat silence exceeded twice the interval.
    pub fn on_heartbeat_timeout(&mut self) -> Result<Option<StateTransition>, TetherError> {
        match self.state {
            Connected => Ok(Some(
                self.transition(Reconnecting, TransitionCause::HeartbeatTimeout),
            )),
            _ => Err(self.invalid("heartbeat timeout")),
        }
    }

    /// Backoff timer fired. From `error` this starts a fresh connect; in
    /// `reconnecting` the open attempt happens without a state change.
    pub fn on_retry(&mut self) -> Result<Option<StateTransition>, TetherError> {
        match self.state {
            Error => Ok(Some(
                self.transition(Connecting, TransitionCause::RetryScheduled),
            )),
            Reconnecting => Ok(None),
            _ => Err(self.invalid("retry")),
        }
    }

    /// The backoff controller ran out of attempts.
    pub fn on_retry_exhausted(&mut self) -> Result<Option<StateTransition>, TetherError> {
        match self.state {
            Reconnecting | Error => Ok(Some(
                self.transition(Failed, TransitionCause::RetryExhausted),
            )),
            _ => Err(self.invalid("retry exhausted")),
        }
    }

    fn invalid(&self, input: &str) -> TetherError {
        warn!(state = %self.state, input, "rejected state machine input");
        TetherError::InvalidTransition {
            state: self.state,
            input: input.to_string(),
        }
    }

    fn transition(&mut self, to: ConnectionState, cause: TransitionCause) -> StateTransition {
        let transition = StateTransition {
            from: self.state,
            to,
            cause,
            at: Utc::now(),
        };
        self.state = to;
        self.transitions += 1;

        if to == Failed || to == Connected {
            info!(from = %transition.from, to = %to, cause = ?transition.cause, "connection state changed");
        } else {
            debug!(from = %transition.from, to = %to, cause = ?transition.cause, "connection state changed");
        }

        self.subscribers
            .retain(|tx| tx.send(transition.clone()).is_ok());
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tether_core::OutboundMessage;

    fn opened() -> TransportEvent {
        TransportEvent::Opened
    }

    fn closed(clean: bool) -> TransportEvent {
        TransportEvent::Closed {
            clean,
            reason: None,
        }
    }

    fn error() -> TransportEvent {
        TransportEvent::Error {
            message: "boom".into(),
        }
    }

    fn connected_machine() -> ConnectionStateMachine {
        let mut m = ConnectionStateMachine::new();
        m.connect().unwrap();
        m.on_transport_event(&opened()).unwrap();
        assert_eq!(m.current_state(), Connected);
        m
    }

    #[test]
    #[tracing_test::traced_test]
    fn rejected_input_is_logged_with_state() {
        let mut m = ConnectionStateMachine::new();
        assert!(m.on_retry().is_err());
        assert!(logs_contain("rejected state machine input"));
        assert!(logs_contain("input=\"retry\""));
        assert!(logs_contain("state=initial"));
    }

    #[test]
    #[tracing_test::traced_test]
    fn reaching_connected_is_logged() {
        connected_machine();
        assert!(logs_contain("connection state changed"));
        assert!(logs_contain("to=connected"));
        assert!(logs_contain("cause=TransportOpened"));
    }

    #[test]
    fn happy_path_initial_to_connected() {
        let mut m = ConnectionStateMachine::new();
        assert_eq!(m.current_state(), Initial);
        let t = m.connect().unwrap().unwrap();
        assert_eq!((t.from, t.to), (Initial, Connecting));
        let t = m.on_transport_event(&opened()).unwrap().unwrap();
        assert_eq!((t.from, t.to), (Connecting, Connected));
        assert_eq!(t.cause, TransitionCause::TransportOpened);
    }

    #[test]
    fn connect_failure_goes_to_error_then_retry_reconnects() {
        let mut m = ConnectionStateMachine::new();
        m.connect().unwrap();
        let t = m.on_transport_event(&error()).unwrap().unwrap();
        assert_eq!(t.to, Error);
        let t = m.on_retry().unwrap().unwrap();
        assert_eq!((t.from, t.to), (Error, Connecting));
    }

    #[test]
    fn clean_close_disconnects_abnormal_close_reconnects() {
        let mut m = connected_machine();
        assert_eq!(m.on_transport_event(&closed(true)).unwrap().unwrap().to, Disconnected);

        let mut m = connected_machine();
        let t = m.on_transport_event(&closed(false)).unwrap().unwrap();
        assert_eq!(t.to, Reconnecting);
        assert_eq!(t.cause, TransitionCause::TransportClosed { clean: false });
    }

    #[test]
    fn heartbeat_timeout_only_valid_when_connected() {
        let mut m = connected_machine();
        let t = m.on_heartbeat_timeout().unwrap().unwrap();
        assert_eq!((t.from, t.to), (Connected, Reconnecting));

        let mut idle = ConnectionStateMachine::new();
        assert!(matches!(
            idle.on_heartbeat_timeout(),
            Err(TetherError::InvalidTransition { state: Initial, .. })
        ));
        assert_eq!(idle.current_state(), Initial);
    }

    #[test]
    fn failed_reconnect_attempt_reenters_reconnecting() {
        let mut m = connected_machine();
        m.on_heartbeat_timeout().unwrap();
        assert!(m.on_retry().unwrap().is_none());
        let t = m.on_transport_event(&error()).unwrap().unwrap();
        assert_eq!((t.from, t.to), (Reconnecting, Reconnecting));
        let t = m.on_transport_event(&opened()).unwrap().unwrap();
        assert_eq!((t.from, t.to), (Reconnecting, Connected));
    }

    #[test]
    fn exhausted_retries_fail_until_explicit_connect() {
        let mut m = connected_machine();
        m.on_transport_event(&closed(false)).unwrap();
        let t = m.on_retry_exhausted().unwrap().unwrap();
        assert_eq!(t.to, Failed);
        assert!(m.on_retry().is_err());
        assert!(m.on_transport_event(&opened()).is_err());
        let t = m.connect().unwrap().unwrap();
        assert_eq!((t.from, t.to), (Failed, Connecting));
    }

    #[test]
    fn authentication_rejection_fails_immediately() {
        let mut m = ConnectionStateMachine::new();
        m.connect().unwrap();
        let t = m
            .on_transport_event(&TransportEvent::AuthenticationRejected {
                reason: "expired".into(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(t.to, Failed);
        assert_eq!(t.cause, TransitionCause::AuthenticationRejected);
    }

    #[test]
    fn disconnect_happens_exactly_once() {
        let mut m = connected_machine();
        assert!(m.disconnect().unwrap().is_some());
        assert!(m.disconnect().unwrap().is_none());
        assert_eq!(m.current_state(), Disconnected);
        assert!(ConnectionStateMachine::new().disconnect().unwrap().is_none());
    }

    #[test]
    fn frames_and_acks_do_not_change_state() {
        let mut m = connected_machine();
        let before = m.transition_count();
        assert!(
            m.on_transport_event(&TransportEvent::Frame(OutboundMessage::heartbeat()))
                .unwrap()
                .is_none()
        );
        assert!(
            m.on_transport_event(&TransportEvent::Ack {
                message_id: "m1".into()
            })
            .unwrap()
            .is_none()
        );
        assert_eq!(m.transition_count(), before);
    }

    #[tokio::test]
    async fn subscribers_see_every_transition_in_order() {
        let mut m = ConnectionStateMachine::new();
        let mut rx = m.subscribe();
        m.connect().unwrap();
        m.on_transport_event(&opened()).unwrap();
        m.on_heartbeat_timeout().unwrap();
        m.on_transport_event(&opened()).unwrap();
        m.disconnect().unwrap();

        let mut seen = Vec::new();
        while let Ok(t) = rx.try_recv() {
            seen.push((t.from, t.to));
        }
        assert_eq!(
            seen,
            vec![
                (Initial, Connecting),
                (Connecting, Connected),
                (Connected, Reconnecting),
                (Reconnecting, Connected),
                (Connected, Disconnected),
            ]
        );
    }

    #[derive(Debug, Clone)]
    enum Input {
        Connect,
        Disconnect,
        Opened,
        Closed(bool),
        Error,
        AuthRejected,
        HeartbeatTimeout,
        Retry,
        RetryExhausted,
    }

    fn input_strategy() -> impl Strategy<Value = Input> {
        prop_oneof![
            Just(Input::Connect),
            Just(Input::Disconnect),
            Just(Input::Opened),
            any::<bool>().prop_map(Input::Closed),
            Just(Input::Error),
            Just(Input::AuthRejected),
            Just(Input::HeartbeatTimeout),
            Just(Input::Retry),
            Just(Input::RetryExhausted),
        ]
    }

    fn apply(m: &mut ConnectionStateMachine, input: &Input) -> Option<StateTransition> {
        let result = match input {
            Input::Connect => m.connect(),
            Input::Disconnect => m.disconnect(),
            Input::Opened => m.on_transport_event(&opened()),
            Input::Closed(clean) => m.on_transport_event(&closed(*clean)),
            Input::Error => m.on_transport_event(&error()),
            Input::AuthRejected => m.on_transport_event(&TransportEvent::AuthenticationRejected {
                reason: "denied".into(),
            }),
            Input::HeartbeatTimeout => m.on_heartbeat_timeout(),
            Input::Retry => m.on_retry(),
            Input::RetryExhausted => m.on_retry_exhausted(),
        };
        result.ok().flatten()
    }

    proptest! {
        #[test]
        fn never_connected_to_connecting(inputs in prop::collection::vec(input_strategy(), 0..64)) {
            let mut m = ConnectionStateMachine::new();
            for input in &inputs {
                let before = m.current_state();
                let result = apply(&mut m, input);
                if let Some(t) = result {
                    prop_assert_eq!(t.from, before);
                    prop_assert_eq!(t.to, m.current_state());
                    prop_assert!(!(t.from == Connected && t.to == Connecting));
                } else {
                    prop_assert_eq!(before, m.current_state());
                }
            }
        }

        #[test]
        fn subscriber_log_matches_applied_transitions(inputs in prop::collection::vec(input_strategy(), 0..64)) {
            let mut m = ConnectionStateMachine::new();
            let mut rx = m.subscribe();
            let mut applied = Vec::new();
            for input in &inputs {
                if let Some(t) = apply(&mut m, input) {
                    applied.push(t);
                }
            }
            let mut published = Vec::new();
            while let Ok(t) = rx.try_recv() {
                published.push(t);
            }
            prop_assert_eq!(published, applied);
        }
    }
}
