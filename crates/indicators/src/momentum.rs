//! Oscillators: RSI, stochastic, ADX.

use crate::sma;

/// Relative Strength Index over rolling mean gain/loss.
///
/// One value per bar after the warmup (`values.len() - period` entries).
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }
    let gains: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    let losses: Vec<f64> = values.windows(2).map(|w| (w[0] - w[1]).max(0.0)).collect();

    let avg_gains = sma(&gains, period);
    let avg_losses = sma(&losses, period);

    avg_gains
        .iter()
        .zip(&avg_losses)
        .map(|(g, l)| {
            if *l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}

/// Stochastic oscillator %K (smoothed) and %D.
///
/// Returns `(k, d)`; empty when the input is too short.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    k_smooth: usize,
) -> (Vec<f64>, Vec<f64>) {
    let n = close.len();
    if period == 0 || n < period || high.len() != n || low.len() != n {
        return (Vec::new(), Vec::new());
    }

    let mut raw_k = Vec::with_capacity(n - period + 1);
    for i in (period - 1)..n {
        let window_low = low[i + 1 - period..=i].iter().cloned().fold(f64::MAX, f64::min);
        let window_high = high[i + 1 - period..=i].iter().cloned().fold(f64::MIN, f64::max);
        let span = window_high - window_low;
        raw_k.push(if span == 0.0 {
            50.0
        } else {
            100.0 * (close[i] - window_low) / span
        });
    }

    let k = sma(&raw_k, k_smooth.max(1));
    let d = sma(&k, 3);
    (k, d)
}

/// Average Directional Index.
///
/// One value per bar after the double warmup.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    if period == 0 || n < 2 * period + 1 || high.len() != n || low.len() != n {
        return Vec::new();
    }

    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    let mut tr = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        let range = (high[i] - low[i])
            .max((high[i] - close[i - 1]).abs())
            .max((low[i] - close[i - 1]).abs());
        tr.push(range);
    }

    let atr = sma(&tr, period);
    let plus = sma(&plus_dm, period);
    let minus = sma(&minus_dm, period);

    let dx: Vec<f64> = plus
        .iter()
        .zip(&minus)
        .zip(&atr)
        .map(|((p, m), a)| {
            if *a == 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * p / a;
            let minus_di = 100.0 * m / a;
            let sum = plus_di + minus_di;
            if sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    sma(&dx, period)
}
