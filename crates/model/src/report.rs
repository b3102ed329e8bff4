//! End-of-day self-evaluation report.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hit-rate accounting for one analyst across the day's signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystAccuracy {
    /// Analyst identifier.
    pub analyst_id: String,
    /// Signals that contributed to closed trades.
    pub signals_scored: u32,
    /// Of those, how many pointed the way the trade resolved profitably.
    pub signals_correct: u32,
}

impl AnalystAccuracy {
    /// Fraction of scored signals that were correct, if any were scored.
    pub fn accuracy(&self) -> Option<Decimal> {
        if self.signals_scored == 0 {
            return None;
        }
        Some(Decimal::from(self.signals_correct) / Decimal::from(self.signals_scored))
    }
}

/// Post-trade analysis output for one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    /// Trading date, `YYYY-MM-DD`.
    pub date: String,
    /// Realized P&L across the day's terminal trades.
    pub realized_pnl: Decimal,
    /// Unrealized P&L still open at report time.
    pub unrealized_pnl: Decimal,
    /// Fraction of terminal trades that closed profitably, if any closed.
    pub hit_rate: Option<Decimal>,
    /// Per-analyst scoring for the day.
    pub analyst_accuracy: Vec<AnalystAccuracy>,
    /// Narrative lessons extracted from the day.
    pub lessons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accuracy_fraction() {
        let acc = AnalystAccuracy {
            analyst_id: "technical".into(),
            signals_scored: 4,
            signals_correct: 3,
        };
        assert_eq!(acc.accuracy(), Some(dec!(0.75)));

        let none = AnalystAccuracy {
            analyst_id: "flow".into(),
            signals_scored: 0,
            signals_correct: 0,
        };
        assert_eq!(none.accuracy(), None);
    }
}
