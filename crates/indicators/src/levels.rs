//! Price levels: classic pivots and support/resistance bands.

/// Classic floor-trader pivot levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Classic pivots from the previous session's high/low/close.
pub fn pivot_points(high: f64, low: f64, close: f64) -> PivotPoints {
    let pivot = (high + low + close) / 3.0;
    let range = high - low;
    PivotPoints {
        pivot,
        r1: 2.0 * pivot - low,
        r2: pivot + range,
        r3: high + 2.0 * (pivot - low),
        s1: 2.0 * pivot - high,
        s2: pivot - range,
        s3: low - 2.0 * (high - pivot),
    }
}

/// Nearest support/resistance band from recent extremes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

/// Support and resistance from the rolling extremes of the last `window`
/// values. `None` when the input is shorter than the window.
pub fn support_resistance(values: &[f64], window: usize) -> Option<SupportResistance> {
    if window == 0 || values.len() < window {
        return None;
    }
    let recent = &values[values.len() - window..];
    let support = recent.iter().cloned().fold(f64::MAX, f64::min);
    let resistance = recent.iter().cloned().fold(f64::MIN, f64::max);
    Some(SupportResistance {
        support,
        resistance,
    })
}
