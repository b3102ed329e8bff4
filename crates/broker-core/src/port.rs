//! The broker port trait.

use crate::{
    BrokerError, Candle, Depth, Funds, HistoryRequest, Holding, MarginRequirement, MarketTick,
    OptionStrike, OrderAck, OrderChanges, OrderIntent, OrderSide, OrderUpdate, PositionSnapshot,
    Profile, Quote, TradebookEntry,
};
use async_trait::async_trait;
use model::Symbol;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capability set the core depends on; real brokerage and simulated
/// adapters both implement it.
///
/// Every operation returns a typed record or a [`BrokerError`]. Rate limits
/// are enforced inside the adapter; breaches surface as
/// `BrokerError::RateLimited` with a retry hint, never as silent queueing.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Latest quotes for a batch of symbols.
    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError>;

    /// Five-level book with session OHLC and circuit limits.
    async fn get_depth(&self, symbol: &Symbol) -> Result<Depth, BrokerError>;

    /// Ordered, finite candle sequence for the request window.
    async fn get_history(&self, request: &HistoryRequest) -> Result<Vec<Candle>, BrokerError>;

    /// Strikes around ATM with OI, IV and greeks.
    async fn get_option_chain(
        &self,
        symbol: &Symbol,
        strike_count: u32,
    ) -> Result<Vec<OptionStrike>, BrokerError>;

    /// Current net positions.
    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError>;

    /// Demat holdings.
    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError>;

    /// Today's orders.
    async fn get_orders(&self) -> Result<Vec<OrderUpdate>, BrokerError>;

    /// Today's fills.
    async fn get_tradebook(&self) -> Result<Vec<TradebookEntry>, BrokerError>;

    /// Account funds.
    async fn get_funds(&self) -> Result<Funds, BrokerError>;

    /// Lightweight profile call used as the auth probe.
    async fn get_profile(&self) -> Result<Profile, BrokerError>;

    /// Place an order.
    ///
    /// Idempotency: a retry with an identical `client_tag` within the
    /// adapter's window is a no-op returning the original id.
    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck, BrokerError>;

    /// Modify a working order.
    async fn modify_order(
        &self,
        broker_order_id: &str,
        changes: &OrderChanges,
    ) -> Result<(), BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    /// Place a protective child (stop or target) against a filled parent.
    async fn place_bracket_child(
        &self,
        parent_order_id: &str,
        side: OrderSide,
        order_type: crate::BrokerOrderType,
        quantity: u32,
        client_tag: &str,
    ) -> Result<OrderAck, BrokerError>;

    /// Margin required for a batch of intents.
    async fn calc_margin(&self, intents: &[OrderIntent]) -> Result<MarginRequirement, BrokerError>;

    /// Subscribe to order updates. At-least-once delivery.
    fn subscribe_orders(&self) -> broadcast::Receiver<OrderUpdate>;

    /// Subscribe to market ticks for the given symbols.
    fn subscribe_market(&self, symbols: &[Symbol]) -> broadcast::Receiver<MarketTick>;

    /// Convenience: last traded price for one symbol.
    async fn last_price(&self, symbol: &Symbol) -> Result<Decimal, BrokerError> {
        let quotes = self.get_quotes(std::slice::from_ref(symbol)).await?;
        quotes
            .into_iter()
            .next()
            .map(|q| q.last_price)
            .ok_or_else(|| BrokerError::InvalidSymbol(symbol.to_string()))
    }
}

/// Shared broker handle.
pub type SharedBroker = Arc<dyn Broker>;
