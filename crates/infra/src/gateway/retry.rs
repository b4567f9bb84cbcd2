//! Retry/backoff policy for provider calls
//!
//! Only transient failures are retried: transport errors, HTTP 429 and 5xx.
//! Everything else surfaces immediately as a typed error.

use std::time::Duration;

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1_000, max_delay_ms: 32_000 }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), with ±25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_ms.saturating_mul(2u64.pow(attempt.min(5)));
        let capped = delay.min(self.max_delay_ms);

        use rand::Rng;
        let jitter_range = (capped as f64 * 0.25) as u64;
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range * 2) as i64 - jitter_range as i64;

        Duration::from_millis((capped as i64 + jitter).max(0) as u64)
    }
}
