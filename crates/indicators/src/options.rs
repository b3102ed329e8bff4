//! Options positioning measures: PCR, max pain, IV rank.

/// Open interest at one strike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeOpenInterest {
    pub strike: f64,
    pub call_oi: f64,
    pub put_oi: f64,
}

/// Put-call ratio by open interest. `None` when call OI is zero.
pub fn put_call_ratio(put_oi: f64, call_oi: f64) -> Option<f64> {
    if call_oi <= 0.0 {
        return None;
    }
    Some(put_oi / call_oi)
}

/// Max-pain strike: the expiry price minimizing the total intrinsic value
/// paid out across the chain.
pub fn max_pain(chain: &[StrikeOpenInterest]) -> Option<f64> {
    if chain.is_empty() {
        return None;
    }
    let mut best: Option<(f64, f64)> = None;
    for candidate in chain {
        let expiry = candidate.strike;
        let mut pain = 0.0;
        for leg in chain {
            // Calls hurt writers when expiry settles above the strike,
            // puts when it settles below.
            pain += leg.call_oi * (expiry - leg.strike).max(0.0);
            pain += leg.put_oi * (leg.strike - expiry).max(0.0);
        }
        match best {
            Some((_, best_pain)) if pain >= best_pain => {}
            _ => best = Some((expiry, pain)),
        }
    }
    best.map(|(strike, _)| strike)
}

/// Rank of the current IV within its history, in [0, 100].
///
/// `None` when history is empty or spans a zero range.
pub fn iv_rank(current_iv: f64, iv_history: &[f64]) -> Option<f64> {
    let min = iv_history.iter().cloned().fold(f64::MAX, f64::min);
    let max = iv_history.iter().cloned().fold(f64::MIN, f64::max);
    if iv_history.is_empty() || max <= min {
        return None;
    }
    Some(((current_iv - min) / (max - min) * 100.0).clamp(0.0, 100.0))
}
