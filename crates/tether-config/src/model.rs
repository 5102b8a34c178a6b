// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tether transport.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages. Durations are
//! stored as integer milliseconds and exposed as [`Duration`] accessors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Tether configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TetherConfig {
    /// Session identity and logging.
    #[serde(default)]
    pub session: SessionConfig,

    /// Transport endpoint, credential and liveness settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Reliable queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// History fetch settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Metrics export settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Session identity and logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Display name used in logs.
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_session_name() -> String {
    "tether".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Transport endpoint and liveness configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// WebSocket endpoint. `None` means the caller supplies a transport.
    #[serde(default)]
    pub url: Option<String>,

    /// Bearer token presented during the handshake.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// How long an open attempt may take before it counts as a transport error.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Expected heartbeat period; silence for twice this long is an abnormal closure.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth_token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

/// Exponential backoff configuration for reconnects.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for the exponential part of the delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Width of the uniform random jitter added to each delay.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Retry attempts allowed before the connection is marked failed.
    #[serde(default = "default_backoff_max_retries")]
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_backoff_max_retries(),
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

fn default_backoff_max_retries() -> u32 {
    5
}

/// Reliable queue configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// How long a sent message waits for its ack before it may be resent.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Send attempts allowed per message.
    #[serde(default = "default_queue_max_retries")]
    pub max_retries: u32,

    /// Optional cap on queued messages. `None` leaves the queue unbounded.
    #[serde(default)]
    pub max_queue_size: Option<usize>,

    /// Period of the resend sweep while connected. Defaults to `ack_timeout_ms`.
    #[serde(default)]
    pub flush_interval_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            max_retries: default_queue_max_retries(),
            max_queue_size: None,
            flush_interval_ms: None,
        }
    }
}

impl QueueConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.unwrap_or(self.ack_timeout_ms))
    }
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_queue_max_retries() -> u32 {
    3
}

/// History fetch configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Base URL of the history API. `None` disables HTTP history.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Messages requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum pages fetched per load.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_page_size() -> usize {
    50
}

fn default_max_pages() -> usize {
    20
}

/// Metrics export configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub prometheus: bool,
}
