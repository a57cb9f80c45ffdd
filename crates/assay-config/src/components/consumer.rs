//! Result consumer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool and retry policy for the result queue consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Deliveries of one message before it is dead-lettered
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// How long one receive call waits before re-checking for shutdown
    pub poll_interval_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Exponential backoff for the given attempt, capped at `retry_max_delay_ms`
    ///
    /// Attempt 1 waits the base delay, attempt 2 twice that, and so on.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(delay)
    }
}
