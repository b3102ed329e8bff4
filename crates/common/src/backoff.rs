//! Exponential backoff with jitter for retrying upstream calls.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// Formula: min(max_delay, base * 2^attempt) + random_jitter. When the
/// upstream supplies an explicit retry-after hint (rate limiting), the hint
/// takes precedence over the computed delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    max_attempts: u32,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 0.1, 5)
    }
}

impl ExponentialBackoff {
    /// Create a new backoff policy.
    ///
    /// # Arguments
    /// * `base` - Initial delay duration
    /// * `max_delay` - Maximum delay cap
    /// * `jitter_factor` - Jitter as a fraction of the delay, clamped to >= 0
    /// * `max_attempts` - Attempts before `next_delay` reports exhaustion
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64, max_attempts: u32) -> Self {
        Self {
            base,
            max_delay,
            jitter_factor: jitter_factor.max(0.0),
            max_attempts,
            attempt: 0,
        }
    }

    /// Next delay, or `None` once the attempt budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }

        let exp = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped = exp.min(self.max_delay);

        let jitter_range = capped.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        self.attempt = self.attempt.saturating_add(1);
        Some(Duration::from_secs_f64(
            (capped.as_secs_f64() + jitter).max(0.0),
        ))
    }

    /// Next delay honouring an upstream retry-after hint in milliseconds.
    ///
    /// The returned delay is never shorter than the hint; the attempt budget
    /// still applies.
    pub fn next_delay_after(&mut self, retry_after_ms: u64) -> Option<Duration> {
        let computed = self.next_delay()?;
        Some(computed.max(Duration::from_millis(retry_after_ms)))
    }

    /// Reset the attempt counter (call after a success).
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts consumed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
