//! Trade lifecycle record.

use crate::{ApprovedOrder, Direction, Symbol, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade lifecycle status.
///
/// ```text
/// PENDING -> WORKING -> OPEN -> CLOSING -> CLOSED
///               \         \        \
///                -> REJECTED, EXPIRED, STOPPED_OUT
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Intent formed, nothing sent to the broker.
    Pending,
    /// Entry order accepted by the broker, no fills yet.
    Working,
    /// Entry filled (fully or above the partial threshold); brackets placed.
    Open,
    /// An exit is in flight.
    Closing,
    /// Closed via target, manual or time-based exit.
    Closed,
    /// Entry rejected by the broker.
    Rejected,
    /// Protective stop fired.
    StoppedOut,
    /// Entry never filled inside the wait window.
    Expired,
}

impl TradeStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Working => "WORKING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
            Self::Rejected => "REJECTED",
            Self::StoppedOut => "STOPPED_OUT",
            Self::Expired => "EXPIRED",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Rejected | Self::StoppedOut | Self::Expired
        )
    }

    /// Whether the trade currently holds (or may acquire) a position.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Working | Self::Open | Self::Closing)
    }

    /// Whether a transition to `next` follows the lifecycle graph.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, next),
            (Pending, Working)
                | (Pending, Rejected)
                | (Working, Open)
                | (Working, Rejected)
                | (Working, Expired)
                | (Open, Closing)
                | (Open, StoppedOut)
                | (Open, Closed)
                | (Closing, Closed)
                | (Closing, StoppedOut)
        )
    }
}

/// Why a trade exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Take-profit target reached.
    TakeProfit,
    /// Protective stop fired.
    StopLoss,
    /// Monitor closed the trade after news invalidated the thesis.
    NewsInvalidation,
    /// End-of-session flatten.
    TimeExit,
    /// Monitor-issued discretionary close.
    MonitorClose,
    /// Daily-loss-floor guard forced the close.
    RiskGuard,
    /// Other, with the broker or operator supplied reason.
    Other(String),
}

impl ExitReason {
    /// Stable tag for journaling and reports.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::NewsInvalidation => "news_invalidation",
            Self::TimeExit => "time_exit",
            Self::MonitorClose => "monitor_close",
            Self::RiskGuard => "risk_guard",
            Self::Other(s) => s,
        }
    }
}

/// Durable lifecycle record of one position from intent to terminal state.
///
/// Owned exclusively by the trade ledger; every status change goes through
/// [`Trade::transition`] so the lifecycle graph is enforced in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Ledger-assigned identifier.
    pub trade_id: String,
    /// Trading date (session id) this trade belongs to, `YYYY-MM-DD`.
    pub session_date: String,
    /// The approved order this trade executes.
    pub approved_order: ApprovedOrder,
    /// Broker id of the entry order, once placed.
    pub entry_order_id: Option<String>,
    /// Broker id of the protective stop child.
    pub sl_order_id: Option<String>,
    /// Broker id of the take-profit child.
    pub tp_order_id: Option<String>,
    /// Entry fill timestamp (ms).
    pub entry_time_ms: Option<i64>,
    /// Average entry fill price.
    pub entry_fill_price: Option<Decimal>,
    /// Shares filled on entry.
    pub filled_qty: u32,
    /// Shares still held (reduced by partial harvests and exits).
    pub remaining_qty: u32,
    /// Exit fill timestamp (ms).
    pub exit_time_ms: Option<i64>,
    /// Average exit fill price.
    pub exit_fill_price: Option<Decimal>,
    /// Realized profit and loss, set as exits fill.
    pub realized_pnl: Option<Decimal>,
    /// Current lifecycle status.
    pub status: TradeStatus,
    /// Exit classification, set when the trade leaves OPEN.
    pub exit_reason: Option<ExitReason>,
    /// Current effective stop level (moves as the monitor trails it).
    pub current_stop: Decimal,
    /// Creation timestamp (ms).
    pub created_at_ms: i64,
}

impl Trade {
    /// Create a trade in `Pending` from an approved order.
    pub fn from_approved(
        trade_id: impl Into<String>,
        session_date: impl Into<String>,
        order: ApprovedOrder,
        created_at_ms: i64,
    ) -> Self {
        Self {
            trade_id: trade_id.into(),
            session_date: session_date.into(),
            current_stop: order.stop_loss,
            approved_order: order,
            entry_order_id: None,
            sl_order_id: None,
            tp_order_id: None,
            entry_time_ms: None,
            entry_fill_price: None,
            filled_qty: 0,
            remaining_qty: 0,
            exit_time_ms: None,
            exit_fill_price: None,
            realized_pnl: None,
            status: TradeStatus::Pending,
            exit_reason: None,
            created_at_ms,
        }
    }

    /// Instrument shortcut.
    pub fn symbol(&self) -> &Symbol {
        &self.approved_order.symbol
    }

    /// Direction shortcut.
    pub fn direction(&self) -> Direction {
        self.approved_order.direction
    }

    /// Move to `next`, rejecting transitions outside the lifecycle graph.
    pub fn transition(&mut self, next: TradeStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Unrealized P&L of the remaining position at `price`.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        let entry = match self.entry_fill_price {
            Some(p) => p,
            None => return Decimal::ZERO,
        };
        let qty = Decimal::from(self.remaining_qty);
        match self.direction() {
            Direction::Long => (price - entry) * qty,
            Direction::Short => (entry - price) * qty,
        }
    }

    /// Profit measured in R-multiples of the original risk distance.
    pub fn r_multiple(&self, price: Decimal) -> Option<Decimal> {
        let entry = self.entry_fill_price?;
        let risk = (self.approved_order.entry_price - self.approved_order.stop_loss).abs();
        if risk.is_zero() {
            return None;
        }
        let gain = match self.direction() {
            Direction::Long => price - entry,
            Direction::Short => entry - price,
        };
        Some(gain / risk)
    }

    /// Worst-case further loss if the current stop is hit.
    pub fn worst_case_loss(&self) -> Decimal {
        let entry = match self.entry_fill_price {
            Some(p) => p,
            None => self.approved_order.entry_price,
        };
        let qty = Decimal::from(self.remaining_qty);
        match self.direction() {
            Direction::Long => (entry - self.current_stop) * qty,
            Direction::Short => (self.current_stop - entry) * qty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntryType, ProductType};
    use rust_decimal_macros::dec;

    fn sample_trade() -> Trade {
        let order = ApprovedOrder::new(
            "c1",
            Symbol::new("NSE:RELIANCE-EQ"),
            Direction::Long,
            500,
            EntryType::Limit,
            dec!(100.1),
            dec!(99.0),
            dec!(101.2),
            ProductType::Intraday,
            "t",
            1,
            dec!(1000),
        )
        .unwrap();
        Trade::from_approved("t1", "2025-01-06", order, 0)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut trade = sample_trade();
        for next in [
            TradeStatus::Working,
            TradeStatus::Open,
            TradeStatus::Closing,
            TradeStatus::Closed,
        ] {
            trade.transition(next).unwrap();
        }
        assert!(trade.status.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut trade = sample_trade();
        // PENDING cannot jump straight to OPEN.
        assert!(trade.transition(TradeStatus::Open).is_err());
        trade.transition(TradeStatus::Working).unwrap();
        trade.transition(TradeStatus::Expired).unwrap();
        // Terminal states are sticky.
        assert!(trade.transition(TradeStatus::Open).is_err());
        assert!(trade.transition(TradeStatus::Closed).is_err());
    }

    #[test]
    fn test_unrealized_pnl_long() {
        let mut trade = sample_trade();
        trade.entry_fill_price = Some(dec!(100.1));
        trade.remaining_qty = 500;
        assert_eq!(trade.unrealized_pnl(dec!(101.1)), dec!(500.0));
        assert_eq!(trade.unrealized_pnl(dec!(99.1)), dec!(-500.0));
    }

    #[test]
    fn test_r_multiple() {
        let mut trade = sample_trade();
        trade.entry_fill_price = Some(dec!(100.1));
        trade.remaining_qty = 500;
        // Risk distance is 1.1; a 1.1 move is exactly 1R.
        assert_eq!(trade.r_multiple(dec!(101.2)), Some(dec!(1)));
    }

    #[test]
    fn test_worst_case_loss_tracks_current_stop() {
        let mut trade = sample_trade();
        trade.entry_fill_price = Some(dec!(100.1));
        trade.remaining_qty = 500;
        assert_eq!(trade.worst_case_loss(), dec!(550.0));
        // Stop trailed to breakeven: no further downside.
        trade.current_stop = dec!(100.1);
        assert_eq!(trade.worst_case_loss(), dec!(0.0));
    }
}
