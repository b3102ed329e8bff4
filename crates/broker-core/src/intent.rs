//! Order intents sent to the broker.

use model::{Direction, ProductType, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position in `direction`.
    pub fn entry_for(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::Buy,
            Direction::Short => Self::Sell,
        }
    }

    /// Side that closes a position in `direction`.
    pub fn exit_for(direction: Direction) -> Self {
        Self::entry_for(direction).opposite()
    }

    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Broker order type, including protective variants used for bracket
/// children.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BrokerOrderType {
    /// Immediate execution at market.
    Market,
    /// Resting limit at the given price.
    Limit(Decimal),
    /// Stop order triggering a market exit at the given trigger.
    StopMarket(Decimal),
    /// Stop order triggering a limit at (trigger, limit).
    StopLimit(Decimal, Decimal),
}

impl BrokerOrderType {
    /// The resting/trigger price this order works at, if any.
    pub fn working_price(&self) -> Option<Decimal> {
        match self {
            Self::Market => None,
            Self::Limit(p) => Some(*p),
            Self::StopMarket(t) => Some(*t),
            Self::StopLimit(t, _) => Some(*t),
        }
    }
}

/// A fully specified order request.
///
/// `client_tag` is the idempotency key: retrying an identical tag within
/// the broker's window must not create a second order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: BrokerOrderType,
    pub quantity: u32,
    pub product_type: ProductType,
    /// Deterministic idempotency tag, e.g. `{trade_id}:entry`.
    pub client_tag: String,
}

impl OrderIntent {
    /// Market order helper.
    pub fn market(
        symbol: Symbol,
        side: OrderSide,
        quantity: u32,
        client_tag: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: BrokerOrderType::Market,
            quantity,
            product_type: ProductType::Intraday,
            client_tag: client_tag.into(),
        }
    }

    /// Limit order helper.
    pub fn limit(
        symbol: Symbol,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
        client_tag: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type: BrokerOrderType::Limit(price),
            quantity,
            product_type: ProductType::Intraday,
            client_tag: client_tag.into(),
        }
    }

    /// Whether this intent reduces or closes a position rather than opening
    /// one, relative to a signed net quantity (positive long).
    pub fn is_reducing(&self, net_qty: i64) -> bool {
        match self.side {
            OrderSide::Buy => net_qty < 0,
            OrderSide::Sell => net_qty > 0,
        }
    }
}

/// Accepted order acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Broker-assigned order id.
    pub broker_order_id: String,
    /// Echo of the idempotency tag.
    pub client_tag: String,
}

/// Mutable fields of a working order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderChanges {
    /// New limit price.
    pub price: Option<Decimal>,
    /// New trigger price (stop orders).
    pub trigger_price: Option<Decimal>,
    /// New quantity.
    pub quantity: Option<u32>,
}

impl OrderChanges {
    /// A change set that only moves the trigger price.
    pub fn trigger(price: Decimal) -> Self {
        Self {
            trigger_price: Some(price),
            ..Self::default()
        }
    }

    /// Whether the change set is a no-op.
    pub fn is_empty(&self) -> bool {
        self.price.is_none() && self.trigger_price.is_none() && self.quantity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_exit_sides() {
        assert_eq!(OrderSide::entry_for(Direction::Long), OrderSide::Buy);
        assert_eq!(OrderSide::exit_for(Direction::Long), OrderSide::Sell);
        assert_eq!(OrderSide::entry_for(Direction::Short), OrderSide::Sell);
        assert_eq!(OrderSide::exit_for(Direction::Short), OrderSide::Buy);
    }

    #[test]
    fn test_is_reducing() {
        let sell = OrderIntent::market(Symbol::new("NSE:TCS-EQ"), OrderSide::Sell, 10, "t:exit");
        assert!(sell.is_reducing(10));
        assert!(!sell.is_reducing(0));
        assert!(!sell.is_reducing(-10));

        let buy = OrderIntent::market(Symbol::new("NSE:TCS-EQ"), OrderSide::Buy, 10, "t:cover");
        assert!(buy.is_reducing(-10));
        assert!(!buy.is_reducing(10));
    }

    #[test]
    fn test_working_price() {
        assert_eq!(BrokerOrderType::Market.working_price(), None);
        assert_eq!(
            BrokerOrderType::Limit(dec!(101)).working_price(),
            Some(dec!(101))
        );
        assert_eq!(
            BrokerOrderType::StopMarket(dec!(99)).working_price(),
            Some(dec!(99))
        );
    }
}
