// src/network/retry.rs
//! Reconnect backoff

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff settings for transient pool failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Give up after this many consecutive failures (unbounded when absent)
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Fresh backoff state for this policy
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Backoff state across consecutive failures
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    /// Delay before the next attempt, or `None` once attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }

        let factor = self.policy.multiplier.max(1.0).powi(self.attempts as i32);
        let delay_ms = (self.policy.initial_delay_ms as f64 * factor)
            .min(self.policy.max_delay_ms as f64)
            .max(0.0);
        self.attempts = self.attempts.saturating_add(1);
        Some(Duration::from_millis(delay_ms as u64))
    }

    /// Consecutive failures so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Call after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
