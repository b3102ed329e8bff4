//! Sliding-window rate limiter enforced inside broker adapters.

use crate::BrokerError;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Window limits with a safety margin.
///
/// Defaults follow the brokerage's published limits (10/s, 200/min,
/// 100 000/day) shaved by the margin so bursts from concurrent workflows
/// stay clear of the hard ceiling.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_day: u32,
    /// Fraction of each limit held back, in [0, 1).
    pub safety_margin: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 10,
            per_minute: 200,
            per_day: 100_000,
            safety_margin: 0.1,
        }
    }
}

impl RateLimitConfig {
    fn effective(&self, limit: u32) -> u32 {
        let scaled = (limit as f64 * (1.0 - self.safety_margin)).floor() as u32;
        scaled.max(1)
    }
}

/// Sliding-window tracker over second/minute/day horizons.
///
/// Callers pass the current timestamp so tests can drive time; on breach
/// the call fails fast with a retry hint instead of queueing.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<WindowState>,
}

struct WindowState {
    second: VecDeque<i64>,
    minute: VecDeque<i64>,
    day_count: u32,
    day_bucket: i64,
}

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60_000;
const DAY_MS: i64 = 86_400_000;

impl RateLimiter {
    /// Create a limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState {
                second: VecDeque::new(),
                minute: VecDeque::new(),
                day_count: 0,
                day_bucket: 0,
            }),
        }
    }

    /// Record one call at `now_ms`, or fail with the wait required for the
    /// tightest breached window.
    pub fn try_acquire(&self, now_ms: i64) -> Result<(), BrokerError> {
        let mut state = self.state.lock();

        while state
            .second
            .front()
            .is_some_and(|t| now_ms - t >= SECOND_MS)
        {
            state.second.pop_front();
        }
        while state
            .minute
            .front()
            .is_some_and(|t| now_ms - t >= MINUTE_MS)
        {
            state.minute.pop_front();
        }
        let bucket = now_ms.div_euclid(DAY_MS);
        if bucket != state.day_bucket {
            state.day_bucket = bucket;
            state.day_count = 0;
        }

        if state.day_count >= self.config.effective(self.config.per_day) {
            let retry_after_ms = ((bucket + 1) * DAY_MS - now_ms).max(1) as u64;
            return Err(BrokerError::RateLimited { retry_after_ms });
        }
        if state.minute.len() as u32 >= self.config.effective(self.config.per_minute) {
            let oldest = *state.minute.front().unwrap_or(&now_ms);
            let retry_after_ms = (oldest + MINUTE_MS - now_ms).max(1) as u64;
            return Err(BrokerError::RateLimited { retry_after_ms });
        }
        if state.second.len() as u32 >= self.config.effective(self.config.per_second) {
            let oldest = *state.second.front().unwrap_or(&now_ms);
            let retry_after_ms = (oldest + SECOND_MS - now_ms).max(1) as u64;
            return Err(BrokerError::RateLimited { retry_after_ms });
        }

        state.second.push_back(now_ms);
        state.minute.push_back(now_ms);
        state.day_count += 1;
        Ok(())
    }
}
