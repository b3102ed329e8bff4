//! Wire DTOs for the brokerage API and their translations to port types.

use broker_core::{
    BrokerError, BrokerOrderStatus, Candle, DepthLevel, Funds, Holding, OptionStrike, OrderSide,
    OrderUpdate, PositionSnapshot, Profile, Quote, TradebookEntry,
};
use model::Symbol;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Envelope every endpoint shares: `s` is `"ok"` or `"error"`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub s: String,
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload or translate the error code.
    pub(crate) fn into_result(self) -> Result<T, BrokerError> {
        if self.s == "ok" {
            return self
                .data
                .ok_or_else(|| BrokerError::Parse("ok response without payload".into()));
        }
        Err(map_api_error(self.code, self.message))
    }
}

/// Translate the broker's error codes into the port taxonomy.
pub(crate) fn map_api_error(code: i32, message: String) -> BrokerError {
    match code {
        -8 | -15 | -16 | -17 => BrokerError::AuthExpired,
        -300 | -310 => BrokerError::InvalidSymbol(message),
        -429 => BrokerError::RateLimited {
            retry_after_ms: 60_000,
        },
        code if (-99..=-50).contains(&code) => BrokerError::Rejected { code, message },
        _ => BrokerError::Upstream(format!("code {code}: {message}")),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuotesPayload {
    #[serde(default)]
    pub d: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteRow {
    pub n: String,
    pub v: QuoteValues,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteValues {
    pub lp: Decimal,
    #[serde(default)]
    pub ch: Decimal,
    #[serde(default)]
    pub chp: Decimal,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub bid: Decimal,
    #[serde(default)]
    pub ask: Decimal,
    #[serde(default)]
    pub tt: i64,
}

impl QuoteRow {
    pub(crate) fn into_quote(self) -> Quote {
        Quote {
            symbol: Symbol::new(self.n),
            last_price: self.v.lp,
            change: self.v.ch,
            change_pct: self.v.chp,
            volume: self.v.volume,
            bid: self.v.bid,
            ask: self.v.ask,
            timestamp_ms: self.v.tt * 1_000,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryPayload {
    #[serde(default)]
    pub candles: Vec<[f64; 6]>,
}

impl HistoryPayload {
    pub(crate) fn into_candles(self, with_oi: bool) -> Vec<Candle> {
        self.candles
            .into_iter()
            .map(|row| Candle {
                timestamp_ms: (row[0] as i64) * 1_000,
                open: row[1],
                high: row[2],
                low: row[3],
                close: row[4],
                volume: row[5],
                open_interest: if with_oi { Some(0.0) } else { None },
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DepthPayload {
    #[serde(default)]
    pub bids: Vec<DepthRow>,
    #[serde(default)]
    pub ask: Vec<DepthRow>,
    #[serde(default)]
    pub o: Decimal,
    #[serde(default)]
    pub h: Decimal,
    #[serde(default)]
    pub l: Decimal,
    #[serde(default)]
    pub c: Decimal,
    #[serde(default)]
    pub lower_ckt: Decimal,
    #[serde(default)]
    pub upper_ckt: Decimal,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DepthRow {
    pub price: Decimal,
    pub volume: u64,
    #[serde(default)]
    pub ord: u32,
}

impl DepthRow {
    pub(crate) fn into_level(self) -> DepthLevel {
        DepthLevel {
            price: self.price,
            quantity: self.volume,
            orders: self.ord,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChainPayload {
    #[serde(default)]
    pub options_chain: Vec<ChainRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChainRow {
    pub strike_price: Decimal,
    #[serde(default)]
    pub call_oi: u64,
    #[serde(default)]
    pub put_oi: u64,
    #[serde(default)]
    pub call_iv: Decimal,
    #[serde(default)]
    pub put_iv: Decimal,
    #[serde(default)]
    pub call_delta: Decimal,
    #[serde(default)]
    pub put_delta: Decimal,
}

impl ChainRow {
    pub(crate) fn into_strike(self) -> OptionStrike {
        OptionStrike {
            strike: self.strike_price,
            call_oi: self.call_oi,
            put_oi: self.put_oi,
            call_iv: self.call_iv,
            put_iv: self.put_iv,
            call_delta: self.call_delta,
            put_delta: self.put_delta,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrdersPayload {
    #[serde(default)]
    pub order_book: Vec<OrderRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderRow {
    pub id: String,
    #[serde(default)]
    pub client_id: String,
    pub symbol: String,
    pub side: i32,
    pub status: i32,
    #[serde(default)]
    pub filled_qty: u32,
    #[serde(default)]
    pub traded_price: Decimal,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub order_date_time_ms: i64,
}

impl OrderRow {
    pub(crate) fn into_update(self) -> OrderUpdate {
        OrderUpdate {
            broker_order_id: self.id,
            client_tag: self.client_id,
            symbol: Symbol::new(self.symbol),
            side: if self.side >= 0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            status: map_order_status(self.status, self.filled_qty),
            filled_qty: self.filled_qty,
            avg_fill_price: (self.traded_price > Decimal::ZERO).then_some(self.traded_price),
            message: (!self.message.is_empty()).then_some(self.message),
            timestamp_ms: self.order_date_time_ms,
        }
    }
}

/// Order status codes: 1 cancelled, 2 filled, 4 triggered, 5 rejected,
/// 6 working.
pub(crate) fn map_order_status(code: i32, filled_qty: u32) -> BrokerOrderStatus {
    match code {
        1 => BrokerOrderStatus::Cancelled,
        2 => BrokerOrderStatus::Filled,
        4 => BrokerOrderStatus::Triggered,
        5 => BrokerOrderStatus::Rejected,
        _ if filled_qty > 0 => BrokerOrderStatus::PartiallyFilled,
        _ => BrokerOrderStatus::Accepted,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionsPayload {
    #[serde(default)]
    pub net_positions: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PositionRow {
    pub symbol: String,
    pub net_qty: i64,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub realized_profit: Decimal,
    #[serde(default)]
    pub unrealized_profit: Decimal,
    #[serde(default)]
    pub product_type: String,
}

impl PositionRow {
    pub(crate) fn into_snapshot(self) -> PositionSnapshot {
        PositionSnapshot {
            symbol: Symbol::new(self.symbol),
            net_qty: self.net_qty,
            avg_price: self.avg_price,
            realized_pnl: self.realized_profit,
            unrealized_pnl: self.unrealized_profit,
            product_type: self.product_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HoldingsPayload {
    #[serde(default)]
    pub holdings: Vec<HoldingRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HoldingRow {
    pub symbol: String,
    pub quantity: u64,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub ltp: Decimal,
}

impl HoldingRow {
    pub(crate) fn into_holding(self) -> Holding {
        Holding {
            symbol: Symbol::new(self.symbol),
            quantity: self.quantity,
            avg_cost: self.cost_price,
            last_price: self.ltp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TradebookPayload {
    #[serde(default)]
    pub trade_book: Vec<TradeRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TradeRow {
    pub order_id: String,
    pub symbol: String,
    pub side: i32,
    pub traded_qty: u32,
    pub trade_price: Decimal,
    #[serde(default)]
    pub trade_time_ms: i64,
}

impl TradeRow {
    pub(crate) fn into_entry(self) -> TradebookEntry {
        TradebookEntry {
            order_id: self.order_id,
            symbol: Symbol::new(self.symbol),
            side: if self.side >= 0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            },
            quantity: self.traded_qty,
            price: self.trade_price,
            traded_at_ms: self.trade_time_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FundsPayload {
    #[serde(default)]
    pub fund_limit: Vec<FundRow>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FundRow {
    pub title: String,
    #[serde(default)]
    pub equity_amount: Decimal,
}

impl FundsPayload {
    pub(crate) fn into_funds(self) -> Funds {
        let find = |title: &str| {
            self.fund_limit
                .iter()
                .find(|r| r.title == title)
                .map(|r| r.equity_amount)
                .unwrap_or(Decimal::ZERO)
        };
        Funds {
            equity_available: find("Available Balance"),
            equity_used: find("Utilized Amount"),
            total_balance: find("Total Balance"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfilePayload {
    pub data: ProfileRow,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileRow {
    pub fy_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email_id: String,
}

impl ProfilePayload {
    pub(crate) fn into_profile(self) -> Profile {
        Profile {
            user_id: self.data.fy_id,
            name: self.data.name,
            email: (!self.data.email_id.is_empty()).then_some(self.data.email_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaceOrderPayload {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MarginPayload {
    #[serde(default)]
    pub margin_total: Decimal,
    #[serde(default)]
    pub margin_avail: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_ok_and_error() {
        let ok: Envelope<QuotesPayload> =
            serde_json::from_str(r#"{"s":"ok","d":[]}"#).unwrap();
        assert!(ok.into_result().is_ok());

        let err: Envelope<QuotesPayload> =
            serde_json::from_str(r#"{"s":"error","code":-16,"message":"token expired"}"#).unwrap();
        assert!(matches!(err.into_result(), Err(BrokerError::AuthExpired)));
    }

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(
            map_api_error(-50, "bad order".into()),
            BrokerError::Rejected { code: -50, .. }
        ));
        assert!(matches!(
            map_api_error(-300, "no such symbol".into()),
            BrokerError::InvalidSymbol(_)
        ));
        assert!(matches!(
            map_api_error(-999, "weird".into()),
            BrokerError::Upstream(_)
        ));
    }

    #[test]
    fn test_order_status_mapping() {
        assert_eq!(map_order_status(2, 100), BrokerOrderStatus::Filled);
        assert_eq!(map_order_status(5, 0), BrokerOrderStatus::Rejected);
        assert_eq!(map_order_status(6, 0), BrokerOrderStatus::Accepted);
        assert_eq!(map_order_status(6, 40), BrokerOrderStatus::PartiallyFilled);
        assert_eq!(map_order_status(1, 0), BrokerOrderStatus::Cancelled);
    }

    #[test]
    fn test_quote_row_translation() {
        let row: QuoteRow = serde_json::from_str(
            r#"{"n":"NSE:TCS-EQ","v":{"lp":3500.5,"ch":10.5,"chp":0.3,"volume":12345,"bid":3500.0,"ask":3501.0,"tt":1736150400}}"#,
        )
        .unwrap();
        let quote = row.into_quote();
        assert_eq!(quote.symbol, Symbol::new("NSE:TCS-EQ"));
        assert_eq!(quote.last_price, dec!(3500.5));
        assert_eq!(quote.timestamp_ms, 1_736_150_400_000);
    }

    #[test]
    fn test_history_translation() {
        let payload: HistoryPayload = serde_json::from_str(
            r#"{"candles":[[1736150400,100.0,101.0,99.5,100.5,5000.0]]}"#,
        )
        .unwrap();
        let candles = payload.into_candles(false);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp_ms, 1_736_150_400_000);
        assert_eq!(candles[0].close, 100.5);
        assert!(candles[0].open_interest.is_none());
    }
}
