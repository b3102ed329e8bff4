//! Wire-neutral records returned by broker adapters.

use model::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest quote for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    /// Last traded price.
    pub last_price: Decimal,
    /// Change from previous close.
    pub change: Decimal,
    /// Change as a percentage of previous close.
    pub change_pct: Decimal,
    /// Session volume in shares.
    pub volume: u64,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Quote timestamp (ms).
    pub timestamp_ms: i64,
}

impl Quote {
    /// Mid price between best bid and ask, falling back to last.
    pub fn mid(&self) -> Decimal {
        if self.bid > Decimal::ZERO && self.ask > Decimal::ZERO {
            (self.bid + self.ask) / Decimal::TWO
        } else {
            self.last_price
        }
    }

    /// Relative bid-ask spread, used as a liquidity proxy.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let mid = self.mid();
        if mid.is_zero() || self.ask < self.bid {
            return None;
        }
        Some((self.ask - self.bid) / mid * Decimal::ONE_HUNDRED)
    }
}

/// One side of a depth level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: u64,
    pub orders: u32,
}

/// Five-level order book with session OHLC and circuit limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depth {
    pub symbol: Symbol,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Lower circuit limit.
    pub lower_circuit: Decimal,
    /// Upper circuit limit.
    pub upper_circuit: Decimal,
}

/// One historical candle. Raw candles feed the indicator kernel only, so
/// the fields are plain `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open timestamp (ms).
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Open interest, when requested for derivatives.
    pub open_interest: Option<f64>,
}

/// Candle history request window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    /// Bar resolution tag (`1`, `5`, `15`, `60`, `D`).
    pub resolution: String,
    /// Window start (ms, inclusive).
    pub from_ms: i64,
    /// Window end (ms, inclusive).
    pub to_ms: i64,
    /// Include open interest.
    pub with_oi: bool,
}

/// One strike row of an option chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionStrike {
    pub strike: Decimal,
    pub call_oi: u64,
    pub put_oi: u64,
    pub call_iv: Decimal,
    pub put_iv: Decimal,
    pub call_delta: Decimal,
    pub put_delta: Decimal,
}

/// Broker-reported net position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol: Symbol,
    /// Signed net quantity (positive long).
    pub net_qty: i64,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub product_type: String,
}

/// Demat holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: u64,
    pub avg_cost: Decimal,
    pub last_price: Decimal,
}

/// Account funds summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funds {
    pub equity_available: Decimal,
    pub equity_used: Decimal,
    pub total_balance: Decimal,
}

/// One tradebook (fill) row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradebookEntry {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: crate::OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub traded_at_ms: i64,
}

/// Margin requirement for a set of intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginRequirement {
    pub total_required: Decimal,
    pub available: Decimal,
    /// Shortfall when required exceeds available, else zero.
    pub shortfall: Decimal,
}

impl MarginRequirement {
    /// Whether the account can carry the batch.
    pub fn is_sufficient(&self) -> bool {
        self.shortfall <= Decimal::ZERO
    }
}

/// Lightweight account profile used as the auth probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: Decimal, ask: Decimal, last: Decimal) -> Quote {
        Quote {
            symbol: Symbol::new("NSE:TCS-EQ"),
            last_price: last,
            change: dec!(0),
            change_pct: dec!(0),
            volume: 0,
            bid,
            ask,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_quote_mid() {
        assert_eq!(quote(dec!(99), dec!(101), dec!(100)).mid(), dec!(100));
        // No book: fall back to last.
        assert_eq!(quote(dec!(0), dec!(0), dec!(100)).mid(), dec!(100));
    }

    #[test]
    fn test_spread_pct() {
        let q = quote(dec!(99.5), dec!(100.5), dec!(100));
        assert_eq!(q.spread_pct(), Some(dec!(1)));
        let crossed = quote(dec!(101), dec!(100), dec!(100));
        assert!(crossed.spread_pct().is_none());
    }

    #[test]
    fn test_margin_sufficiency() {
        let ok = MarginRequirement {
            total_required: dec!(1000),
            available: dec!(5000),
            shortfall: dec!(0),
        };
        assert!(ok.is_sufficient());
        let short = MarginRequirement {
            total_required: dec!(5000),
            available: dec!(1000),
            shortfall: dec!(4000),
        };
        assert!(!short.is_sufficient());
    }
}
