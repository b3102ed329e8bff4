//! Volatility measures: Bollinger bands and ATR.

use crate::{mean, sma, std_dev};

/// One Bollinger band sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over a rolling window.
///
/// One sample per full window; empty when the input is shorter than
/// `period`.
pub fn bollinger_bands(values: &[f64], period: usize, std_mult: f64) -> Vec<BollingerBand> {
    if period < 2 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .filter_map(|w| {
            let middle = mean(w)?;
            let sd = std_dev(w)?;
            Some(BollingerBand {
                upper: middle + std_mult * sd,
                middle,
                lower: middle - std_mult * sd,
            })
        })
        .collect()
}

/// Average True Range over a rolling window.
///
/// The first true range uses the bar's own high-low span; later bars
/// include the gap from the previous close. One value per full window.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    if period == 0 || n < period || high.len() != n || low.len() != n {
        return Vec::new();
    }

    let mut tr = Vec::with_capacity(n);
    tr.push(high[0] - low[0]);
    for i in 1..n {
        let range = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        tr.push(range);
    }

    sma(&tr, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let flat = vec![100.0; 25];
        let bands = bollinger_bands(&flat, 20, 2.0);
        let last = bands.last().unwrap();
        assert_close(last.upper, 100.0, 1e-9);
        assert_close(last.middle, 100.0, 1e-9);
        assert_close(last.lower, 100.0, 1e-9);
    }

    #[test]
    fn test_bollinger_bands_bracket_mean() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bands = bollinger_bands(&values, 20, 2.0);
        for band in bands {
            assert!(band.lower < band.middle && band.middle < band.upper);
        }
    }

    #[test]
    fn test_atr_constant_range() {
        // Every bar spans exactly 3 points with no gaps.
        let high: Vec<f64> = (0..20).map(|i| 103.0 + i as f64).collect();
        let low: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let close: Vec<f64> = (0..20).map(|i| 102.0 + i as f64).collect();
        let out = atr(&high, &low, &close, 14);
        assert!(!out.is_empty());
        assert_close(*out.last().unwrap(), 3.0, 1e-9);
    }

    #[test]
    fn test_atr_includes_gaps() {
        // A gap-up bar contributes the distance from the previous close.
        let high = vec![101.0, 111.0];
        let low = vec![99.0, 109.0];
        let close = vec![100.0, 110.0];
        let out = atr(&high, &low, &close, 2);
        // TR = [2.0, max(2, |111-100|, |109-100|)] = [2, 11]; SMA = 6.5.
        assert_close(out[0], 6.5, 1e-9);
    }

    #[test]
    fn test_atr_insufficient_data() {
        assert!(atr(&[1.0], &[1.0], &[1.0], 14).is_empty());
    }
}
