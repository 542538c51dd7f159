//! Bounded exponential backoff for remote operations
//!
//! Only connectivity failures are retried; logical errors surface
//! immediately. Delays double per attempt up to a cap, with a small
//! random jitter so that concurrent jobs hitting the same endpoint do
//! not retry in lockstep.

use crate::engine::{EngineError, EngineResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Retry budget and backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts (first try included)
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Cap on any single delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries (tests and drills).
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), jittered.
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let jitter = if exp > 0 {
            rand::thread_rng().gen_range(0..=exp / 4)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }

    /// Run `f`, retrying connectivity failures within the budget.
    pub fn run<T, F>(&self, mut f: F) -> EngineResult<T>
    where
        F: FnMut() -> EngineResult<T>,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_connectivity() => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    thread::sleep(self.delay(attempt));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
