//! Engine tunables.

use rust_decimal::Decimal;
use std::time::Duration;

/// Execution engine configuration.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// How long to wait for the entry fill before the partial-fill policy
    /// applies.
    pub fill_wait: Duration,
    /// Poll interval while waiting for fills.
    pub poll_interval: Duration,
    /// Relative spread (percent) at or below which a symbol counts as
    /// liquid enough for market entries.
    pub liquid_spread_pct: Decimal,
    /// Composite score magnitude from which a candidate counts as a
    /// momentum trade.
    pub momentum_score: Decimal,
    /// Offset applied to limit entries on illiquid names, as a fraction of
    /// the entry price.
    pub illiquid_limit_offset: Decimal,
    /// Consecutive bracket placement failures before the position is
    /// force-closed.
    pub bracket_failure_limit: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_wait: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            liquid_spread_pct: Decimal::new(15, 2),
            momentum_score: Decimal::from(5),
            illiquid_limit_offset: Decimal::new(1, 3),
            bracket_failure_limit: 2,
        }
    }
}
