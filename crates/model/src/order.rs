//! Risk-sized orders approved for execution.

use crate::{Direction, Symbol, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the entry order is worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Resting limit order at `entry_price`.
    Limit,
    /// Immediate market order; `entry_price` is the reference used for risk.
    Market,
}

impl EntryType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
        }
    }
}

/// Broker product bucket for the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProductType {
    /// Intraday (auto square-off at session close).
    #[default]
    Intraday,
    /// Delivery.
    Delivery,
    /// Margin product.
    Margin,
}

impl ProductType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intraday => "INTRADAY",
            Self::Delivery => "DELIVERY",
            Self::Margin => "MARGIN",
        }
    }
}

/// A candidate that has passed risk sizing and capital checks.
///
/// Per-order invariants (quantity lot alignment, per-trade risk cap) are
/// enforced here; batch-level caps (sector exposure, daily loss floor) are
/// the risk sizer's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedOrder {
    /// Originating candidate.
    pub candidate_id: String,
    /// Instrument.
    pub symbol: Symbol,
    /// Long or short.
    pub direction: Direction,
    /// Shares to trade; positive, lot-aligned.
    pub quantity: u32,
    /// Entry order style.
    pub entry_type: EntryType,
    /// Entry reference price (limit price for limit entries).
    pub entry_price: Decimal,
    /// Protective stop level.
    pub stop_loss: Decimal,
    /// Profit target level.
    pub take_profit: Decimal,
    /// Broker product bucket.
    pub product_type: ProductType,
    /// Free-form tag propagated to broker order tags.
    pub tag: String,
}

impl ApprovedOrder {
    /// Construct an approved order, enforcing lot alignment and the
    /// per-trade risk cap.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        candidate_id: impl Into<String>,
        symbol: Symbol,
        direction: Direction,
        quantity: u32,
        entry_type: EntryType,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        product_type: ProductType,
        tag: impl Into<String>,
        lot_size: u32,
        per_trade_risk_cap: Decimal,
    ) -> Result<Self, ValidationError> {
        if quantity == 0 || lot_size == 0 || quantity % lot_size != 0 {
            return Err(ValidationError::BadQuantity { quantity, lot_size });
        }
        let risk = Decimal::from(quantity) * (entry_price - stop_loss).abs();
        if risk > per_trade_risk_cap {
            return Err(ValidationError::RiskCapExceeded {
                risk,
                cap: per_trade_risk_cap,
            });
        }
        Ok(Self {
            candidate_id: candidate_id.into(),
            symbol,
            direction,
            quantity,
            entry_type,
            entry_price,
            stop_loss,
            take_profit,
            product_type,
            tag: tag.into(),
        })
    }

    /// Worst-case loss if the stop is hit at its level.
    pub fn risk_amount(&self) -> Decimal {
        Decimal::from(self.quantity) * (self.entry_price - self.stop_loss).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn approved(quantity: u32, lot: u32, cap: Decimal) -> Result<ApprovedOrder, ValidationError> {
        ApprovedOrder::new(
            "c1",
            Symbol::new("NSE:RELIANCE-EQ"),
            Direction::Long,
            quantity,
            EntryType::Limit,
            dec!(100.1),
            dec!(99.0),
            dec!(101.2),
            ProductType::Intraday,
            "intraday",
            lot,
            cap,
        )
    }

    #[test]
    fn test_lot_alignment() {
        assert!(approved(500, 1, dec!(1000)).is_ok());
        assert!(approved(0, 1, dec!(1000)).is_err());
        assert!(approved(7, 5, dec!(100000)).is_err());
        assert!(approved(10, 5, dec!(100000)).is_ok());
    }

    #[test]
    fn test_per_trade_risk_cap() {
        // 500 shares * 1.1 stop distance = 550 risk.
        assert!(approved(500, 1, dec!(550)).is_ok());
        let err = approved(500, 1, dec!(500)).unwrap_err();
        assert!(matches!(err, ValidationError::RiskCapExceeded { .. }));
    }

    #[test]
    fn test_risk_amount() {
        let order = approved(500, 1, dec!(550)).unwrap();
        assert_eq!(order.risk_amount(), dec!(550.0));
    }
}
