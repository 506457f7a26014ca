//! Bounded exponential retry delay.

use core::time::Duration;

use crate::config::ReconnectPolicy;

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    failures: u32,
    current_ms: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            current_ms: policy.initial_delay_ms,
        }
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the delay before the next attempt, or
    /// `None` once `max_attempts` consecutive failures have been recorded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.failures >= max {
                return None;
            }
        }
        self.failures = self.failures.saturating_add(1);

        let delay = self.current_ms.min(self.policy.max_delay_ms);
        self.current_ms = self
            .current_ms
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_delay_ms);
        Some(Duration::from_millis(delay as u64))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.current_ms = self.policy.initial_delay_ms;
    }
}
