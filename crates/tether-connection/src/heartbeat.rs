// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heartbeat liveness monitor.
//!
//! While connected the session sends a heartbeat probe every interval and
//! expects heartbeat traffic back. Silence for more than twice the interval
//! means the transport is dead even if it still reports itself open.
//!
//! The monitor is plain data driven by the session actor; it never sleeps.
//! Instants come from `tokio::time` so tests can run on paused time.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use tether_core::MessageId;

/// Tracks heartbeat liveness and probe round trips for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_seen: Option<Instant>,
    outstanding: Option<(MessageId, Instant)>,
}

impl HeartbeatMonitor {
    /// A stopped monitor for the given heartbeat interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seen: None,
            outstanding: None,
        }
    }

    /// Configured heartbeat interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum tolerated silence.
    pub fn timeout_window(&self) -> Duration {
        self.interval * 2
    }

    /// Starts monitoring from `now` (on entering `connected`).
    pub fn start(&mut self, now: Instant) {
        self.last_seen = Some(now);
        self.outstanding = None;
    }

    /// Stops monitoring (on leaving `connected`).
    pub fn stop(&mut self) {
        self.last_seen = None;
        self.outstanding = None;
    }

    /// Whether the monitor is running.
    pub fn is_running(&self) -> bool {
        self.last_seen.is_some()
    }

    /// Records inbound heartbeat traffic.
    pub fn record_heartbeat(&mut self, now: Instant) {
        if self.last_seen.is_some() {
            self.last_seen = Some(now);
        }
    }

    /// Records that probe `id` was sent at `now`. A newer probe replaces an unanswered one.
    pub fn probe_sent(&mut self, id: MessageId, now: Instant) {
        if let Some((stale, _)) = self.outstanding.replace((id, now)) {
            trace!(probe = %stale, "heartbeat probe superseded before ack");
        }
    }

    /// Whether `id` is the outstanding probe.
    pub fn is_probe(&self, id: &MessageId) -> bool {
        self.outstanding.as_ref().is_some_and(|(probe, _)| probe == id)
    }

    /// Handles an ack for `id`. Returns the round-trip time if it matched the
    /// outstanding probe; a matching ack also counts as heartbeat traffic.
    pub fn probe_acked(&mut self, id: &MessageId, now: Instant) -> Option<Duration> {
        if !self.is_probe(id) {
            return None;
        }
        let (_, sent_at) = self.outstanding.take()?;
        self.record_heartbeat(now);
        Some(now.saturating_duration_since(sent_at))
    }

    /// First instant at which the silence exceeds the window, at millisecond resolution.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_seen
            .map(|seen| seen + self.timeout_window() + Duration::from_millis(1))
    }

    /// Whether silence has lasted longer than twice the interval.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.last_seen
            .is_some_and(|seen| now.saturating_duration_since(seen) > self.timeout_window())
    }
}
