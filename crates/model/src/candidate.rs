//! Risk-eligible trade candidates.

use crate::{StockSignal, Symbol, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }

    /// Parse from the wire representation.
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "LONG" => Some(Self::Long),
            "SHORT" => Some(Self::Short),
            _ => None,
        }
    }

    /// The opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// Minimum confidence a candidate must carry to be emitted.
pub const CANDIDATE_CONFIDENCE_FLOOR: Decimal = Decimal::from_parts(70, 0, 0, false, 2);

/// A stock pick with direction and explicit entry/stop/target levels,
/// eligible for risk sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate identifier (stable across sizing).
    pub candidate_id: String,
    /// Instrument.
    pub symbol: Symbol,
    /// Long or short.
    pub direction: Direction,
    /// Composite conviction score from aggregation.
    pub composite_score: Decimal,
    /// Aggregated confidence in [0, 1]; at least 0.70 on emit.
    pub confidence: Decimal,
    /// Acceptable entry band (low, high).
    pub entry_low: Decimal,
    /// Acceptable entry band upper bound.
    pub entry_high: Decimal,
    /// Protective stop level.
    pub stop_loss: Decimal,
    /// Profit target level.
    pub take_profit: Decimal,
    /// Signals that contributed to this pick.
    pub contributing_signals: Vec<StockSignal>,
}

impl Candidate {
    /// Construct a candidate, enforcing the level geometry for the
    /// direction, the minimum target move and the confidence floor.
    ///
    /// `target_move` is the minimum required |take_profit - entry| as a
    /// fraction of the entry midpoint (injected configuration).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candidate_id: impl Into<String>,
        symbol: Symbol,
        direction: Direction,
        composite_score: Decimal,
        confidence: Decimal,
        entry_low: Decimal,
        entry_high: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        target_move: Decimal,
        contributing_signals: Vec<StockSignal>,
    ) -> Result<Self, ValidationError> {
        if entry_low > entry_high {
            return Err(ValidationError::BadLevels(format!(
                "entry range inverted: [{entry_low}, {entry_high}]"
            )));
        }
        match direction {
            Direction::Long => {
                if stop_loss >= entry_low {
                    return Err(ValidationError::BadLevels(format!(
                        "long stop {stop_loss} must be below entry low {entry_low}"
                    )));
                }
                if take_profit <= entry_high {
                    return Err(ValidationError::BadLevels(format!(
                        "long target {take_profit} must be above entry high {entry_high}"
                    )));
                }
            }
            Direction::Short => {
                if stop_loss <= entry_high {
                    return Err(ValidationError::BadLevels(format!(
                        "short stop {stop_loss} must be above entry high {entry_high}"
                    )));
                }
                if take_profit >= entry_low {
                    return Err(ValidationError::BadLevels(format!(
                        "short target {take_profit} must be below entry low {entry_low}"
                    )));
                }
            }
        }

        let entry_mid = (entry_low + entry_high) / Decimal::TWO;
        let min_move = target_move * entry_mid;
        if (take_profit - entry_mid).abs() < min_move {
            return Err(ValidationError::TargetTooClose {
                tp: take_profit,
                entry: entry_mid,
                min_move,
            });
        }

        if confidence < CANDIDATE_CONFIDENCE_FLOOR {
            return Err(ValidationError::LowConfidence(confidence));
        }

        Ok(Self {
            candidate_id: candidate_id.into(),
            symbol,
            direction,
            composite_score,
            confidence,
            entry_low,
            entry_high,
            stop_loss,
            take_profit,
            contributing_signals,
        })
    }

    /// Entry band midpoint.
    pub fn entry_mid(&self) -> Decimal {
        (self.entry_low + self.entry_high) / Decimal::TWO
    }

    /// Per-share risk distance between entry midpoint and stop.
    pub fn stop_distance(&self) -> Decimal {
        (self.entry_mid() - self.stop_loss).abs()
    }
}
