//! Clock abstraction so time-driven components can be tested deterministically.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of wall-clock time.
///
/// Production code uses [`SystemClock`]; tests drive a [`VirtualClock`]
/// forward manually.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current instant in the given fixed offset (venue-local time).
    fn now_local(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        self.now_utc().with_timezone(&offset)
    }

    /// Current UTC timestamp in milliseconds.
    fn now_ms(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
pub struct VirtualClock {
    now: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    /// Create a virtual clock starting at the given instant.
    pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(now) })
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for VirtualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_virtual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 3, 30, 0).unwrap();
        let clock = VirtualClock::starting_at(start);
        assert_eq!(clock.now_utc(), start);

        clock.advance(Duration::minutes(20));
        assert_eq!(clock.now_utc(), start + Duration::minutes(20));
    }

    #[test]
    fn test_local_conversion() {
        // 03:30 UTC == 09:00 IST (+05:30).
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 3, 30, 0).unwrap();
        let clock = VirtualClock::starting_at(start);
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();

        let local = clock.now_local(ist);
        assert_eq!(local.format("%H:%M").to_string(), "09:00");
    }
}
