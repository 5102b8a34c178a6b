// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff policy.

use std::time::Duration;

use rand::Rng;

use tether_config::BackoffConfig;

/// Largest exponent applied to the base delay; beyond this the cap always wins.
const MAX_EXPONENT: u32 = 30;

/// `delay = min(base * 2^attempt, max) + uniform(0, jitter)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    /// Retries allowed before the session gives up and enters `failed`.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl BackoffPolicy {
    /// Builds a policy from the `[backoff]` section.
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter: config.jitter(),
            max_retries: config.max_retries,
        }
    }

    /// Builder: disable jitter, for deterministic delays.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = Duration::ZERO;
        self
    }

    /// Capped exponential delay for a zero-based retry index, without jitter.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay for a zero-based retry index with jitter drawn from `rng`.
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.capped_delay(attempt);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rng.gen_range(0..=jitter_ms))
    }

    /// Whether `attempt` (one-based) is past the retry budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }
}
