// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that long-running commands monitor. Sessions are then
//! shut down one by one, each bounded by a timeout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handle::SessionHandle;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(err) => {
                    warn!(error = %err, "SIGTERM handler unavailable; listening for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Shuts down every session, waiting at most `timeout` for each.
///
/// Returns the number of sessions that did not stop in time.
pub async fn shutdown_sessions(sessions: &[SessionHandle], timeout: Duration) -> usize {
    let mut stragglers = 0;
    for session in sessions {
        if session.is_closed() {
            continue;
        }
        match tokio::time::timeout(timeout, session.shutdown()).await {
            Ok(Ok(())) => debug!(session_id = %session.id(), "session shut down"),
            Ok(Err(err)) => debug!(session_id = %session.id(), error = %err, "session already stopped"),
            Err(_) => {
                warn!(session_id = %session.id(), "session did not shut down in time");
                stragglers += 1;
            }
        }
    }
    if stragglers == 0 {
        info!(count = sessions.len(), "all sessions shut down");
    }
    stragglers
}
