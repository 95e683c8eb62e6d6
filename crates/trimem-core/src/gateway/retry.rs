//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Retry policy for gateway calls.
///
/// Delay for 0-based attempt `n` is `base_delay_ms * 2^n`, capped at
/// `max_delay_ms`, then spread by ±`jitter_ratio`. Only transient errors are
/// retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first call (default: 3)
    pub max_attempts: u32,

    /// Initial backoff in milliseconds (default: 1000)
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds (default: 60000)
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the delay (default: 0.25)
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Backoff before retrying after the 0-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(32));
        let capped = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(apply_jitter(capped, self.jitter_ratio).min(self.max_delay_ms))
    }

    /// Run `operation`, retrying transient failures until the attempt budget
    /// is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient gateway failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn apply_jitter(base_ms: u64, ratio: f64) -> u64 {
    let spread = (base_ms as f64 * ratio.clamp(0.0, 1.0)) as i64;
    if spread == 0 {
        return base_ms;
    }
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    (base_ms as i64 + offset).max(0) as u64
}
