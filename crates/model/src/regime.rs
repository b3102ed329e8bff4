//! Market regime artifact.

use crate::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Coarse market state used as a gate and weight on analyst output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeState {
    /// Low volatility, full sizing allowed.
    Calm,
    /// Ordinary conditions.
    Normal,
    /// Elevated volatility, reduced sizing.
    Elevated,
    /// Trading halted for the day; no new positions.
    Halt,
}

impl RegimeState {
    /// Parse from the wire representation.
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "CALM" => Some(Self::Calm),
            "NORMAL" => Some(Self::Normal),
            "ELEVATED" => Some(Self::Elevated),
            "HALT" => Some(Self::Halt),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calm => "CALM",
            Self::Normal => "NORMAL",
            Self::Elevated => "ELEVATED",
            Self::Halt => "HALT",
        }
    }
}

/// Market regime with its position-size multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    /// Regime bucket.
    pub state: RegimeState,
    /// Volatility index reading the classification was based on.
    pub vix: Decimal,
    /// Multiplier applied to position sizing, in [0, 1.5].
    pub position_multiplier: Decimal,
    /// Production timestamp in milliseconds.
    pub produced_at_ms: i64,
}

impl Regime {
    /// Construct a regime, enforcing the multiplier range and the
    /// HALT-implies-zero invariant.
    pub fn new(
        state: RegimeState,
        vix: Decimal,
        position_multiplier: Decimal,
        produced_at_ms: i64,
    ) -> Result<Self, ValidationError> {
        let max = Decimal::new(15, 1);
        if position_multiplier < Decimal::ZERO || position_multiplier > max {
            return Err(ValidationError::OutOfRange {
                field: "position_multiplier",
                value: position_multiplier,
                min: Decimal::ZERO,
                max,
            });
        }
        if state == RegimeState::Halt && !position_multiplier.is_zero() {
            return Err(ValidationError::HaltMultiplierNonZero(position_multiplier));
        }
        Ok(Self {
            state,
            vix,
            position_multiplier,
            produced_at_ms,
        })
    }

    /// True when the regime forbids opening positions.
    pub fn is_halted(&self) -> bool {
        self.state == RegimeState::Halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_halt_requires_zero_multiplier() {
        let err = Regime::new(RegimeState::Halt, dec!(35), dec!(0.5), 0).unwrap_err();
        assert!(matches!(err, ValidationError::HaltMultiplierNonZero(_)));

        let regime = Regime::new(RegimeState::Halt, dec!(35), dec!(0), 0).unwrap();
        assert!(regime.is_halted());
    }

    #[test]
    fn test_multiplier_range() {
        assert!(Regime::new(RegimeState::Calm, dec!(11), dec!(1.5), 0).is_ok());
        assert!(Regime::new(RegimeState::Calm, dec!(11), dec!(1.6), 0).is_err());
        assert!(Regime::new(RegimeState::Calm, dec!(11), dec!(-0.1), 0).is_err());
    }

    #[test]
    fn test_state_tags_roundtrip() {
        for state in [
            RegimeState::Calm,
            RegimeState::Normal,
            RegimeState::Elevated,
            RegimeState::Halt,
        ] {
            assert_eq!(RegimeState::from_str_tag(state.as_str()), Some(state));
        }
        assert_eq!(RegimeState::from_str_tag("PANIC"), None);
    }
}
