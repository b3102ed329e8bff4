//! Monitor tunables.

use chrono::NaiveTime;
use rust_decimal::Decimal;

/// Monitor configuration. All thresholds are injected; the decision code
/// carries no constants of its own.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// R-multiple from which winners trail their stop.
    pub trail_trigger_r: Decimal,
    /// ATR multiple for the trailing stop, in [1.5, 2].
    pub trail_atr_k: Decimal,
    /// R-multiple from which part of the position is booked.
    pub partial_trigger_r: Decimal,
    /// Fraction of the remaining position a harvest books.
    pub partial_fraction: Decimal,
    /// ATR multiple for the tightened stop after `close_tighten_time`.
    pub tighten_atr_k: Decimal,
    /// ATR fraction inside which a losing trade counts as about to stop
    /// out and is closed proactively.
    pub stop_proximity_atr: Decimal,
    /// Venue-local time after which stops tighten.
    pub close_tighten_time: NaiveTime,
    /// Venue-local time after which everything is flattened.
    pub flatten_time: NaiveTime,
    /// ATR lookback period.
    pub atr_period: usize,
    /// Candle resolution for the ATR request (minutes).
    pub atr_resolution_min: u32,
    /// Session-wide cumulative loss boundary (absolute, positive).
    pub daily_loss_floor: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            trail_trigger_r: Decimal::ONE,
            trail_atr_k: Decimal::TWO,
            partial_trigger_r: Decimal::TWO,
            partial_fraction: Decimal::new(5, 1),
            tighten_atr_k: Decimal::new(75, 2),
            stop_proximity_atr: Decimal::new(25, 2),
            close_tighten_time: NaiveTime::from_hms_opt(14, 45, 0).unwrap(),
            flatten_time: NaiveTime::from_hms_opt(15, 10, 0).unwrap(),
            atr_period: 14,
            atr_resolution_min: 5,
            daily_loss_floor: Decimal::from(2_000),
        }
    }
}
