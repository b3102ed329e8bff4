//! Pair-trading statistics: correlation, beta, spread z-score, half-life.

use crate::{mean, std_dev};

/// Pearson correlation between two equal-length series.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(cov / denom)
}

/// OLS beta of stock returns on market returns.
pub fn beta(stock_returns: &[f64], market_returns: &[f64]) -> Option<f64> {
    if stock_returns.len() != market_returns.len() || stock_returns.len() < 2 {
        return None;
    }
    let mean_s = mean(stock_returns)?;
    let mean_m = mean(market_returns)?;
    let mut cov = 0.0;
    let mut var_m = 0.0;
    for (s, m) in stock_returns.iter().zip(market_returns) {
        cov += (s - mean_s) * (m - mean_m);
        var_m += (m - mean_m).powi(2);
    }
    if var_m == 0.0 {
        return None;
    }
    Some(cov / var_m)
}

/// Z-score of the latest spread value against the series mean/std.
pub fn z_score(spread: &[f64]) -> Option<f64> {
    let last = *spread.last()?;
    let m = mean(spread)?;
    let sd = std_dev(spread)?;
    if sd == 0.0 {
        return None;
    }
    Some((last - m) / sd)
}

/// Half-life of mean reversion from regressing the spread change on the
/// lagged spread level. `None` when the spread is not mean-reverting
/// (non-negative slope) or too short.
pub fn half_life(spread: &[f64]) -> Option<f64> {
    if spread.len() < 3 {
        return None;
    }
    let lagged = &spread[..spread.len() - 1];
    let deltas: Vec<f64> = spread.windows(2).map(|w| w[1] - w[0]).collect();

    let mean_lag = mean(lagged)?;
    let mean_delta = mean(&deltas)?;
    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in lagged.iter().zip(&deltas) {
        cov += (x - mean_lag) * (y - mean_delta);
        var += (x - mean_lag).powi(2);
    }
    if var == 0.0 {
        return None;
    }
    let slope = cov / var;
    if slope >= 0.0 {
        return None;
    }
    Some(-(2.0f64.ln()) / slope)
}
