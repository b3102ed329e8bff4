//! Pure numerical transforms over candle/price sequences.
//!
//! The kernel is the only part of the system that consumes raw candles;
//! analysts receive computed summaries. Every function is deterministic,
//! does no I/O, and reports insufficient data as `None`/empty rather than
//! emitting NaN.

mod levels;
mod momentum;
mod options;
mod pairs;
mod trend;
mod volatility;
mod volume;

pub use levels::{pivot_points, support_resistance, PivotPoints, SupportResistance};
pub use momentum::{adx, rsi, stochastic};
pub use options::{iv_rank, max_pain, put_call_ratio, StrikeOpenInterest};
pub use pairs::{beta, half_life, pearson_correlation, z_score};
pub use trend::{ema, macd, sma, MacdSeries};
pub use volatility::{atr, bollinger_bands, BollingerBand};
pub use volume::{obv, vwap};

/// Simple returns between consecutive values.
///
/// Output has one entry per input pair; zero denominators are skipped.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.len() < 2 {
        return None;
    }
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_returns() {
        let returns = simple_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(returns.len(), 2);
        assert_close(returns[0], 0.10, 1e-12);
        assert_close(returns[1], -0.10, 1e-12);
    }

    #[test]
    fn test_kernel_is_deterministic() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let first = rsi(&closes, 14);
        let second = rsi(&closes, 14);
        assert_eq!(first, second);
    }
}
