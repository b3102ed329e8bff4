//! Per-analyst stock signals.

use crate::{Symbol, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Analyst-declared score bounds, validated on signal ingest.
///
/// Different analysts speak different ranges (a technical desk scores ±5,
/// a derivatives desk ±3); the bounds travel with the signal so aggregation
/// can normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    /// Inclusive minimum score.
    pub min: i32,
    /// Inclusive maximum score.
    pub max: i32,
}

impl ScoreRange {
    /// Symmetric range ±magnitude.
    pub fn symmetric(magnitude: i32) -> Self {
        Self {
            min: -magnitude,
            max: magnitude,
        }
    }

    /// Whether the score falls inside the range.
    pub fn contains(&self, score: i32) -> bool {
        score >= self.min && score <= self.max
    }

    /// Normalize a score into [-1, 1].
    pub fn normalize(&self, score: i32) -> Decimal {
        let span = self.max.max(-self.min);
        if span == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(score) / Decimal::from(span)
    }
}

/// A single analyst's view on one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSignal {
    /// Instrument the signal refers to.
    pub symbol: Symbol,
    /// Producing analyst identifier.
    pub analyst_id: String,
    /// Signed conviction score within the declared range.
    pub score: i32,
    /// Declared bounds for `score`.
    pub score_range: ScoreRange,
    /// Confidence in [0, 1].
    pub confidence: Decimal,
    /// Free-text reasoning behind the signal.
    pub rationale: String,
    /// Production timestamp in milliseconds.
    pub produced_at_ms: i64,
}

impl StockSignal {
    /// Construct a signal, validating the score against the declared range
    /// and the confidence against [0, 1].
    pub fn new(
        symbol: Symbol,
        analyst_id: impl Into<String>,
        score: i32,
        score_range: ScoreRange,
        confidence: Decimal,
        rationale: impl Into<String>,
        produced_at_ms: i64,
    ) -> Result<Self, ValidationError> {
        let analyst_id = analyst_id.into();
        if !score_range.contains(score) {
            return Err(ValidationError::ScoreOutOfBounds {
                analyst_id,
                score,
                min: score_range.min,
                max: score_range.max,
            });
        }
        if confidence < Decimal::ZERO || confidence > Decimal::ONE {
            return Err(ValidationError::OutOfRange {
                field: "confidence",
                value: confidence,
                min: Decimal::ZERO,
                max: Decimal::ONE,
            });
        }
        Ok(Self {
            symbol,
            analyst_id,
            score,
            score_range,
            confidence,
            rationale: rationale.into(),
            produced_at_ms,
        })
    }

    /// Score normalized into [-1, 1] using the declared range.
    pub fn normalized_score(&self) -> Decimal {
        self.score_range.normalize(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_score_bounds_enforced() {
        let range = ScoreRange::symmetric(5);
        let err = StockSignal::new(
            Symbol::new("NSE:TCS-EQ"),
            "technical",
            7,
            range,
            dec!(0.8),
            "breakout",
            0,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ScoreOutOfBounds { .. }));
    }

    #[test]
    fn test_confidence_bounds() {
        let range = ScoreRange::symmetric(3);
        assert!(StockSignal::new(
            Symbol::new("NSE:TCS-EQ"),
            "flow",
            2,
            range,
            dec!(1.1),
            "",
            0
        )
        .is_err());
    }

    #[test]
    fn test_normalized_score() {
        let range = ScoreRange::symmetric(5);
        let signal = StockSignal::new(
            Symbol::new("NSE:INFY-EQ"),
            "technical",
            -5,
            range,
            dec!(0.9),
            "breakdown",
            0,
        )
        .unwrap();
        assert_eq!(signal.normalized_score(), dec!(-1));
    }
}
