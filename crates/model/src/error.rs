//! Artifact validation errors.

use rust_decimal::Decimal;
use thiserror::Error;

/// Invariant violations caught at artifact construction.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A numeric field is outside its declared range.
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: Decimal,
        /// Inclusive lower bound.
        min: Decimal,
        /// Inclusive upper bound.
        max: Decimal,
    },

    /// A halted regime must carry a zero position multiplier.
    #[error("HALT regime requires position multiplier 0, got {0}")]
    HaltMultiplierNonZero(Decimal),

    /// Signal score is outside the analyst-declared bounds.
    #[error("score {score} outside declared range [{min}, {max}] for analyst {analyst_id}")]
    ScoreOutOfBounds {
        /// Analyst that produced the signal.
        analyst_id: String,
        /// Offending score.
        score: i32,
        /// Declared minimum.
        min: i32,
        /// Declared maximum.
        max: i32,
    },

    /// Stop/target levels do not bracket the entry range for the direction.
    #[error("{0}")]
    BadLevels(String),

    /// Take-profit distance is below the minimum target move.
    #[error("take profit {tp} within {min_move} of entry {entry}")]
    TargetTooClose {
        /// Take-profit level.
        tp: Decimal,
        /// Entry reference price.
        entry: Decimal,
        /// Minimum required absolute move.
        min_move: Decimal,
    },

    /// Candidate confidence is below the emission floor.
    #[error("confidence {0} below emission floor 0.70")]
    LowConfidence(Decimal),

    /// Quantity is zero or not a multiple of the lot size.
    #[error("quantity {quantity} invalid for lot size {lot_size}")]
    BadQuantity {
        /// Requested quantity.
        quantity: u32,
        /// Symbol lot size.
        lot_size: u32,
    },

    /// Order risk exceeds the per-trade cap.
    #[error("order risk {risk} exceeds per-trade cap {cap}")]
    RiskCapExceeded {
        /// quantity * |entry - stop| for the order.
        risk: Decimal,
        /// Configured per-trade risk cap.
        cap: Decimal,
    },

    /// A required field is missing or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A trade state transition not present in the lifecycle graph.
    #[error("illegal trade transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current status.
        from: crate::TradeStatus,
        /// Requested status.
        to: crate::TradeStatus,
    },
}
