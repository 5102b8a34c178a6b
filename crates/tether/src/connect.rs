// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether connect` command implementation.
//!
//! Runs one session over the WebSocket transport until Ctrl+C/SIGTERM, the
//! optional duration elapses, or the session fails. Each stdin line is queued
//! as a text message; session events are printed as they arrive. The final
//! metrics snapshot is printed as JSON on the way out.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tether_bus::SessionEvent;
use tether_config::TetherConfig;
use tether_core::{ConnectionState, ConversationId, TetherError};
use tether_session::{SessionBuilder, SessionHandle, install_signal_handler, shutdown_sessions};
use tether_ws::{HttpHistory, WsTransport};

use crate::history::format_timeline;

/// How long shutdown waits for the session to close its transport.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Override `connection.url`.
    #[arg(long)]
    pub url: Option<String>,

    /// Queue a message before reading stdin. May be repeated.
    #[arg(long = "message", value_name = "TEXT")]
    pub messages: Vec<String>,

    /// Load and print this conversation's history after connecting.
    #[arg(long)]
    pub conversation: Option<String>,

    /// Disconnect after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Do not read messages from stdin.
    #[arg(long)]
    pub no_stdin: bool,
}

pub async fn run_connect(mut config: TetherConfig, args: ConnectArgs) -> Result<(), TetherError> {
    if let Some(url) = args.url {
        config.connection.url = Some(url);
    }

    #[cfg(feature = "prometheus")]
    let exporter = if config.metrics.prometheus {
        Some(tether_metrics::PrometheusExporter::install()?)
    } else {
        None
    };

    let transport = Arc::new(WsTransport::from_config(&config)?);
    let mut builder = SessionBuilder::new(transport).with_config(&config);
    if let Some(history) = HttpHistory::from_config(&config)? {
        builder = builder.with_history(Arc::new(history));
    }
    let session = builder.spawn();
    info!(session_id = %session.id(), name = %config.session.name, "session created");

    let mut events = session.subscribe().await?;
    let cancel = install_signal_handler();
    session.connect().await?;

    for text in args.messages {
        session.send_message(text).await?;
    }
    if let Some(conversation) = args.conversation {
        let timeline = session.load_history(&ConversationId(conversation)).await?;
        print!("{}", format_timeline(&timeline));
    }

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = !args.no_stdin;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            () = wait_until(deadline) => {
                info!("duration elapsed, disconnecting");
                break;
            }
            envelope = events.recv() => {
                let Some(envelope) = envelope else { break };
                report(&session, &envelope.event).await;
                if let SessionEvent::Transition(t) = &envelope.event {
                    if t.to == ConnectionState::Failed {
                        warn!(cause = ?t.cause, "session failed");
                        break;
                    }
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let text = line.trim();
                    if !text.is_empty() {
                        let id = session.send_message(text.to_string()).await?;
                        debug!(message_id = %id, "message queued");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin read failed; no more input");
                    stdin_open = false;
                }
            }
        }
    }

    let metrics = session.metrics_snapshot().await?;
    let json = serde_json::to_string_pretty(&metrics)
        .map_err(|e| TetherError::Internal(format!("failed to serialise metrics: {e}")))?;
    println!("{json}");

    #[cfg(feature = "prometheus")]
    {
        if let Some(exporter) = &exporter {
            print!("{}", exporter.render());
        }
    }

    let stragglers = shutdown_sessions(std::slice::from_ref(&session), SHUTDOWN_TIMEOUT).await;
    if stragglers > 0 {
        warn!(stragglers, "session did not stop cleanly");
    }
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn report(session: &SessionHandle, event: &SessionEvent) {
    if let SessionEvent::MessageReceived { id, .. } = event {
        match session.merged_timeline().await {
            Ok(timeline) => {
                if let Some(message) = timeline.get(id) {
                    println!("< {}: {}", message.role, message.content);
                }
            }
            Err(e) => debug!(error = %e, "timeline unavailable"),
        }
        return;
    }

    match describe(event) {
        Some(line) => println!("{line}"),
        None => debug!(event = event.name(), "session event"),
    }
}

/// The console line for an event, if it is worth showing.
fn describe(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Transition(t) => Some(format!("* {} -> {} ({:?})", t.from, t.to, t.cause)),
        SessionEvent::MessageAcked { id } => Some(format!("> {id} delivered")),
        SessionEvent::MessageFailed {
            id,
            attempts,
            error,
        } => Some(format!(
            "! {id} failed after {attempts} attempts: {}",
            error.message
        )),
        SessionEvent::MessageDropped { id } => Some(format!("! {id} dropped, queue full")),
        SessionEvent::RetryScheduled { attempt, delay } => {
            Some(format!("* reconnect attempt {attempt} in {}ms", delay.as_millis()))
        }
        SessionEvent::ConnectionError(record) => Some(format!("! {}", record.message)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{ErrorKind, ErrorRecord, MessageId, StateTransition, TransitionCause};

    #[test]
    fn describes_transitions_and_failures() {
        let at = "2026-03-01T10:00:00Z".parse().unwrap();
        let transition = SessionEvent::Transition(StateTransition {
            from: ConnectionState::Connected,
            to: ConnectionState::Reconnecting,
            cause: TransitionCause::HeartbeatTimeout,
            at,
        });
        assert_eq!(
            describe(&transition).unwrap(),
            "* connected -> reconnecting (HeartbeatTimeout)"
        );

        let failed = SessionEvent::MessageFailed {
            id: MessageId::from("m1"),
            attempts: 3,
            error: ErrorRecord {
                kind: ErrorKind::Message,
                message: "not acknowledged".into(),
                code: Some("max_retries_exceeded".into()),
                at,
            },
        };
        assert_eq!(
            describe(&failed).unwrap(),
            "! m1 failed after 3 attempts: not acknowledged"
        );

        let retry = SessionEvent::RetryScheduled {
            attempt: 2,
            delay: Duration::from_millis(2_000),
        };
        assert_eq!(describe(&retry).unwrap(), "* reconnect attempt 2 in 2000ms");
    }

    #[test]
    fn quiet_events_are_not_printed() {
        assert!(describe(&SessionEvent::HeartbeatReceived).is_none());
        assert!(describe(&SessionEvent::TimelineUpdated { len: 3 }).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_honours_deadline() {
        let start = Instant::now();
        wait_until(Some(start + Duration::from_secs(3))).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
