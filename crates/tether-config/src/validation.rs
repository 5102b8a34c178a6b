// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as URL schemes, non-zero timers and ordered delay bounds.

use crate::diagnostic::ConfigError;
use crate::model::TetherConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TetherConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let level = config.session.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "session.log_level `{}` must be one of {}",
            config.session.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if let Some(url) = &config.connection.url {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            fail(format!(
                "connection.url `{url}` must use the ws:// or wss:// scheme"
            ));
        }
    }

    if config.connection.heartbeat_interval_ms == 0 {
        fail("connection.heartbeat_interval_ms must be greater than 0".to_string());
    }

    if config.connection.connect_timeout_ms == 0 {
        fail("connection.connect_timeout_ms must be greater than 0".to_string());
    }

    if config.backoff.base_delay_ms == 0 {
        fail("backoff.base_delay_ms must be greater than 0".to_string());
    }

    if config.backoff.max_delay_ms < config.backoff.base_delay_ms {
        fail(format!(
            "backoff.max_delay_ms ({}) must not be lower than backoff.base_delay_ms ({})",
            config.backoff.max_delay_ms, config.backoff.base_delay_ms
        ));
    }

    if config.queue.ack_timeout_ms == 0 {
        fail("queue.ack_timeout_ms must be greater than 0".to_string());
    }

    if config.queue.max_retries == 0 {
        fail("queue.max_retries must be at least 1".to_string());
    }

    if config.queue.max_queue_size == Some(0) {
        fail("queue.max_queue_size must be at least 1 when set".to_string());
    }

    if config.queue.flush_interval_ms == Some(0) {
        fail("queue.flush_interval_ms must be greater than 0 when set".to_string());
    }

    if let Some(base) = &config.history.base_url {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            fail(format!(
                "history.base_url `{base}` must use the http:// or https:// scheme"
            ));
        }
    }

    if config.history.page_size == 0 {
        fail("history.page_size must be at least 1".to_string());
    }

    if config.history.max_pages == 0 {
        fail("history.max_pages must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = TetherConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn http_url_fails_validation() {
        let mut config = TetherConfig::default();
        config.connection.url = Some("http://chat.example".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "connection.url"));
    }

    #[test]
    fn inverted_delay_bounds_fail_validation() {
        let mut config = TetherConfig::default();
        config.backoff.base_delay_ms = 5_000;
        config.backoff.max_delay_ms = 1_000;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "backoff.max_delay_ms"));
    }

    #[test]
    fn zero_queue_cap_fails_validation() {
        let mut config = TetherConfig::default();
        config.queue.max_queue_size = Some(0);
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "queue.max_queue_size"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = TetherConfig::default();
        config.session.log_level = "loud".to_string();
        config.queue.max_retries = 0;
        config.history.page_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = TetherConfig::default();
        config.connection.url = Some("wss://chat.example/ws".to_string());
        config.history.base_url = Some("https://chat.example/api".to_string());
        config.queue.max_queue_size = Some(100);
        config.session.log_level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
