// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime settings of one session, derived from [`TetherConfig`].

use std::time::Duration;

use tether_config::TetherConfig;
use tether_queue::QueueLimits;
use tether_resilience::BackoffPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound on one transport open attempt.
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Period of the resend sweep while connected.
    pub flush_interval: Duration,
    pub backoff: BackoffPolicy,
    pub queue: QueueLimits,
}

impl SessionSettings {
    pub fn from_config(config: &TetherConfig) -> Self {
        Self {
            connect_timeout: config.connection.connect_timeout(),
            heartbeat_interval: config.connection.heartbeat_interval(),
            flush_interval: config.queue.flush_interval(),
            backoff: BackoffPolicy::from_config(&config.backoff),
            queue: QueueLimits::from_config(&config.queue),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&TetherConfig::default())
    }
}
