// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is a no-op.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

use tether_core::{ConnectionState, ErrorKind};

/// Register all Tether metric descriptions.
///
/// Called once after a recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "tether_state_transitions_total",
        "Connection state transitions, labelled by target state"
    );
    describe_counter!(
        "tether_reconnect_attempts_total",
        "Entries into reconnecting or error"
    );
    describe_counter!("tether_messages_sent_total", "Outbound send attempts");
    describe_counter!("tether_message_retries_total", "Outbound resends after an ack timeout");
    describe_counter!("tether_messages_received_total", "Inbound frames");
    describe_counter!("tether_messages_acked_total", "Acknowledged outbound messages");
    describe_counter!(
        "tether_messages_failed_total",
        "Messages that exhausted their retries"
    );
    describe_counter!(
        "tether_messages_dropped_total",
        "Messages evicted by the queue-size cap"
    );
    describe_counter!("tether_heartbeats_sent_total", "Heartbeat probes sent");
    describe_counter!("tether_heartbeats_received_total", "Heartbeat frames received");
    describe_counter!("tether_errors_total", "Errors observed, labelled by kind");
    describe_gauge!("tether_connected_sessions", "Sessions currently connected");
    describe_histogram!(
        "tether_heartbeat_latency_seconds",
        "Round-trip time of heartbeat probes in seconds"
    );
}

pub fn record_transition(to: ConnectionState) {
    metrics::counter!("tether_state_transitions_total", "to" => to.to_string()).increment(1);
}

pub fn record_reconnect_attempt() {
    metrics::counter!("tether_reconnect_attempts_total").increment(1);
}

/// Record a send; attempts after the first also count as retries.
pub fn record_message_sent(attempt: u32) {
    metrics::counter!("tether_messages_sent_total").increment(1);
    if attempt > 1 {
        metrics::counter!("tether_message_retries_total").increment(1);
    }
}

pub fn record_message_received() {
    metrics::counter!("tether_messages_received_total").increment(1);
}

pub fn record_message_acked() {
    metrics::counter!("tether_messages_acked_total").increment(1);
}

pub fn record_message_failed() {
    metrics::counter!("tether_messages_failed_total").increment(1);
}

pub fn record_message_dropped() {
    metrics::counter!("tether_messages_dropped_total").increment(1);
}

pub fn record_heartbeat_sent() {
    metrics::counter!("tether_heartbeats_sent_total").increment(1);
}

pub fn record_heartbeat_received() {
    metrics::counter!("tether_heartbeats_received_total").increment(1);
}

pub fn record_error(kind: ErrorKind) {
    metrics::counter!("tether_errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_latency(rtt: Duration) {
    metrics::histogram!("tether_heartbeat_latency_seconds").record(rtt.as_secs_f64());
}

pub fn session_connected() {
    metrics::gauge!("tether_connected_sessions").increment(1.0);
}

pub fn session_disconnected() {
    metrics::gauge!("tether_connected_sessions").decrement(1.0);
}
