//! Moving averages and MACD.

/// Simple moving average.
///
/// One value per full window; empty when the input is shorter than `period`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}

/// Exponential moving average, seeded with the first value.
///
/// Output is aligned to the input (same length).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for v in &values[1..] {
        current = alpha * v + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    /// Fast EMA minus slow EMA.
    pub macd: Vec<f64>,
    /// EMA of the MACD line.
    pub signal: Vec<f64>,
    /// MACD minus signal.
    pub histogram: Vec<f64>,
}

/// MACD with the classic 12/26/9 parameters unless overridden.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdSeries> {
    if values.len() < slow || fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&macd_line, signal_period);
    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    Some(MacdSeries {
        macd: macd_line,
        signal: signal_line,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn test_sma_window() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out, vec![2.0, 3.0, 4.0]);
        assert!(sma(&[1.0, 2.0], 3).is_empty());
    }

    #[test]
    fn test_ema_converges_toward_latest() {
        let out = ema(&[10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0, 20.0], 3);
        assert_eq!(out.len(), 8);
        assert!(out[7] > 19.0, "EMA should converge toward 20, got {}", out[7]);
    }

    #[test]
    fn test_macd_flat_series_is_zero() {
        let flat = vec![50.0; 40];
        let out = macd(&flat, 12, 26, 9).unwrap();
        assert_close(*out.macd.last().unwrap(), 0.0, 1e-9);
        assert_close(*out.histogram.last().unwrap(), 0.0, 1e-9);
    }

    #[test]
    fn test_macd_rising_series_positive() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let out = macd(&rising, 12, 26, 9).unwrap();
        assert!(*out.macd.last().unwrap() > 0.0);
    }

    #[test]
    fn test_macd_insufficient_data() {
        assert!(macd(&[1.0; 10], 12, 26, 9).is_none());
    }
}
