//! In-process simulated broker.
//!
//! Implements the full broker port against an injectable price table.
//! Resting orders (limits, stops, bracket children) trigger as prices move
//! through them, so lifecycle tests and the paper-trading mode exercise the
//! same code paths as a live adapter.

use async_trait::async_trait;
use broker_core::{
    Broker, BrokerError, BrokerOrderStatus, BrokerOrderType, Candle, Depth, DepthLevel, Funds,
    HistoryRequest, Holding, MarginRequirement, MarketTick, OptionStrike, OrderAck, OrderChanges,
    OrderIntent, OrderSide, OrderUpdate, PositionSnapshot, Profile, Quote, RateLimitConfig,
    RateLimiter, TradebookEntry,
};
use dashmap::DashMap;
use model::Symbol;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// How entry orders fill when placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillMode {
    /// Fill the full quantity immediately.
    Immediate,
    /// Fill the given fraction immediately, leave the rest working.
    Partial(Decimal),
    /// Leave orders resting until the price crosses them.
    Resting,
    /// Accept orders but never fill them.
    NoFill,
}

/// Simulated broker configuration.
#[derive(Debug, Clone)]
pub struct SimBrokerConfig {
    pub fill_mode: FillMode,
    /// Client-tag idempotency window in milliseconds.
    pub idempotency_window_ms: i64,
    pub rate_limits: RateLimitConfig,
    /// Funds reported by `get_funds`.
    pub starting_balance: Decimal,
}

impl Default for SimBrokerConfig {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Immediate,
            idempotency_window_ms: 60_000,
            rate_limits: RateLimitConfig::default(),
            starting_balance: Decimal::from(100_000),
        }
    }
}

#[derive(Debug, Clone)]
struct SimOrder {
    broker_order_id: String,
    client_tag: String,
    symbol: Symbol,
    side: OrderSide,
    order_type: BrokerOrderType,
    quantity: u32,
    filled_qty: u32,
    avg_fill_price: Option<Decimal>,
    status: BrokerOrderStatus,
}

impl SimOrder {
    fn to_update(&self, now_ms: i64) -> OrderUpdate {
        OrderUpdate {
            broker_order_id: self.broker_order_id.clone(),
            client_tag: self.client_tag.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            status: self.status,
            filled_qty: self.filled_qty,
            avg_fill_price: self.avg_fill_price,
            message: None,
            timestamp_ms: now_ms,
        }
    }
}

/// Simulated broker. Cheap to clone via `Arc`; all state is interior.
pub struct SimBroker {
    config: RwLock<SimBrokerConfig>,
    prices: RwLock<HashMap<Symbol, Decimal>>,
    candles: RwLock<HashMap<Symbol, Vec<Candle>>>,
    chains: RwLock<HashMap<Symbol, Vec<OptionStrike>>>,
    orders: DashMap<String, SimOrder>,
    /// client_tag -> (order id, placed_at_ms) for the idempotency window.
    tags: DashMap<String, (String, i64)>,
    /// Signed net position per symbol from simulated fills.
    net_positions: DashMap<Symbol, (i64, Decimal)>,
    fills: Mutex<Vec<TradebookEntry>>,
    next_id: AtomicU64,
    order_tx: broadcast::Sender<OrderUpdate>,
    market_tx: broadcast::Sender<MarketTick>,
    limiter: RateLimiter,
    /// Errors queued by tests to fail the next N calls.
    fault_queue: Mutex<Vec<BrokerError>>,
}

impl SimBroker {
    /// Create a simulator with the given config.
    pub fn new(config: SimBrokerConfig) -> Self {
        let (order_tx, _) = broadcast::channel(256);
        let (market_tx, _) = broadcast::channel(1024);
        Self {
            limiter: RateLimiter::new(config.rate_limits.clone()),
            config: RwLock::new(config),
            prices: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            chains: RwLock::new(HashMap::new()),
            orders: DashMap::new(),
            tags: DashMap::new(),
            net_positions: DashMap::new(),
            fills: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            order_tx,
            market_tx,
            fault_queue: Mutex::new(Vec::new()),
        }
    }

    /// Simulator with default config.
    pub fn with_defaults() -> Self {
        Self::new(SimBrokerConfig::default())
    }

    /// Change the fill behaviour mid-test.
    pub fn set_fill_mode(&self, mode: FillMode) {
        self.config.write().fill_mode = mode;
    }

    /// Queue an error for the next broker call.
    pub fn inject_fault(&self, error: BrokerError) {
        self.fault_queue.lock().push(error);
    }

    /// Seed candle history for a symbol.
    pub fn set_history(&self, symbol: Symbol, candles: Vec<Candle>) {
        self.candles.write().insert(symbol, candles);
    }

    /// Seed an option chain for a symbol.
    pub fn set_option_chain(&self, symbol: Symbol, strikes: Vec<OptionStrike>) {
        self.chains.write().insert(symbol, strikes);
    }

    /// Update the last price for a symbol, triggering any resting orders
    /// the move crosses and publishing a market tick.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.prices.write().insert(symbol.clone(), price);
        let now_ms = now_ms();
        let _ = self.market_tx.send(MarketTick {
            symbol: symbol.clone(),
            last_price: price,
            volume: 0,
            timestamp_ms: now_ms,
        });
        self.trigger_resting(symbol, price, now_ms);
    }

    /// Number of orders the simulator has accepted (for idempotency tests).
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Every intent the simulator has seen for one symbol.
    pub fn orders_for(&self, symbol: &Symbol) -> Vec<OrderUpdate> {
        let now = now_ms();
        self.orders
            .iter()
            .filter(|o| &o.symbol == symbol)
            .map(|o| o.to_update(now))
            .collect()
    }

    fn check_fault(&self) -> Result<(), BrokerError> {
        if let Some(err) = self.fault_queue.lock().pop() {
            return Err(err);
        }
        Ok(())
    }

    fn gate(&self) -> Result<(), BrokerError> {
        self.check_fault()?;
        self.limiter.try_acquire(now_ms())
    }

    fn price_of(&self, symbol: &Symbol) -> Result<Decimal, BrokerError> {
        self.prices
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::InvalidSymbol(symbol.to_string()))
    }

    fn next_order_id(&self) -> String {
        format!("SIM-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether a resting order is marketable at `price`.
    fn crosses(side: OrderSide, order_type: &BrokerOrderType, price: Decimal) -> bool {
        match (order_type, side) {
            (BrokerOrderType::Market, _) => true,
            (BrokerOrderType::Limit(limit), OrderSide::Buy) => price <= *limit,
            (BrokerOrderType::Limit(limit), OrderSide::Sell) => price >= *limit,
            (BrokerOrderType::StopMarket(trigger), OrderSide::Buy) => price >= *trigger,
            (BrokerOrderType::StopMarket(trigger), OrderSide::Sell) => price <= *trigger,
            (BrokerOrderType::StopLimit(trigger, _), OrderSide::Buy) => price >= *trigger,
            (BrokerOrderType::StopLimit(trigger, _), OrderSide::Sell) => price <= *trigger,
        }
    }

    /// Price a crossing order fills at.
    fn fill_price(order_type: &BrokerOrderType, market_price: Decimal) -> Decimal {
        match order_type {
            BrokerOrderType::Limit(limit) => *limit,
            BrokerOrderType::StopMarket(trigger) => *trigger,
            BrokerOrderType::StopLimit(_, limit) => *limit,
            BrokerOrderType::Market => market_price,
        }
    }

    fn apply_fill(&self, order: &mut SimOrder, fill_qty: u32, price: Decimal, now_ms: i64) {
        if fill_qty == 0 {
            return;
        }
        order.filled_qty += fill_qty;
        order.avg_fill_price = Some(price);
        order.status = if order.filled_qty >= order.quantity {
            BrokerOrderStatus::Filled
        } else {
            BrokerOrderStatus::PartiallyFilled
        };

        let signed = match order.side {
            OrderSide::Buy => fill_qty as i64,
            OrderSide::Sell => -(fill_qty as i64),
        };
        let mut entry = self
            .net_positions
            .entry(order.symbol.clone())
            .or_insert((0, Decimal::ZERO));
        entry.0 += signed;
        entry.1 = price;

        self.fills.lock().push(TradebookEntry {
            order_id: order.broker_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: fill_qty,
            price,
            traded_at_ms: now_ms,
        });

        let _ = self.order_tx.send(order.to_update(now_ms));
        debug!(
            order_id = %order.broker_order_id,
            symbol = %order.symbol,
            fill_qty,
            price = %price,
            "sim fill"
        );
    }

    fn trigger_resting(&self, symbol: &Symbol, price: Decimal, now_ms: i64) {
        let ids: Vec<String> = self
            .orders
            .iter()
            .filter(|o| {
                &o.symbol == symbol
                    && !o.status.is_terminal()
                    && Self::crosses(o.side, &o.order_type, price)
            })
            .map(|o| o.broker_order_id.clone())
            .collect();

        for id in ids {
            if let Some(mut order) = self.orders.get_mut(&id) {
                if order.status.is_terminal() {
                    continue;
                }
                let remaining = order.quantity - order.filled_qty;
                let fill_at = Self::fill_price(&order.order_type, price);
                self.apply_fill(&mut order, remaining, fill_at, now_ms);
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl Broker for SimBroker {
    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError> {
        self.gate()?;
        let prices = self.prices.read();
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let last = prices
                .get(symbol)
                .copied()
                .ok_or_else(|| BrokerError::InvalidSymbol(symbol.to_string()))?;
            let tick = Decimal::new(5, 2);
            out.push(Quote {
                symbol: symbol.clone(),
                last_price: last,
                change: Decimal::ZERO,
                change_pct: Decimal::ZERO,
                volume: 100_000,
                bid: last - tick,
                ask: last + tick,
                timestamp_ms: now_ms(),
            });
        }
        Ok(out)
    }

    async fn get_depth(&self, symbol: &Symbol) -> Result<Depth, BrokerError> {
        self.gate()?;
        let last = self.price_of(symbol)?;
        let tick = Decimal::new(5, 2);
        let level = |price: Decimal| DepthLevel {
            price,
            quantity: 1_000,
            orders: 10,
        };
        Ok(Depth {
            symbol: symbol.clone(),
            bids: (1..=5).map(|i| level(last - tick * Decimal::from(i))).collect(),
            asks: (1..=5).map(|i| level(last + tick * Decimal::from(i))).collect(),
            open: last,
            high: last,
            low: last,
            close: last,
            lower_circuit: last * Decimal::new(9, 1),
            upper_circuit: last * Decimal::new(11, 1),
        })
    }

    async fn get_history(&self, request: &HistoryRequest) -> Result<Vec<Candle>, BrokerError> {
        self.gate()?;
        let candles = self.candles.read();
        let series = candles
            .get(&request.symbol)
            .ok_or_else(|| BrokerError::InvalidSymbol(request.symbol.to_string()))?;
        Ok(series
            .iter()
            .filter(|c| c.timestamp_ms >= request.from_ms && c.timestamp_ms <= request.to_ms)
            .copied()
            .collect())
    }

    async fn get_option_chain(
        &self,
        symbol: &Symbol,
        strike_count: u32,
    ) -> Result<Vec<OptionStrike>, BrokerError> {
        self.gate()?;
        let chains = self.chains.read();
        let chain = chains.get(symbol).cloned().unwrap_or_default();
        Ok(chain.into_iter().take(strike_count as usize * 2 + 1).collect())
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        self.gate()?;
        Ok(self
            .net_positions
            .iter()
            .filter(|entry| entry.value().0 != 0)
            .map(|entry| PositionSnapshot {
                symbol: entry.key().clone(),
                net_qty: entry.value().0,
                avg_price: entry.value().1,
                realized_pnl: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
                product_type: "INTRADAY".into(),
            })
            .collect())
    }

    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        self.gate()?;
        Ok(Vec::new())
    }

    async fn get_orders(&self) -> Result<Vec<OrderUpdate>, BrokerError> {
        self.gate()?;
        let now = now_ms();
        Ok(self.orders.iter().map(|o| o.to_update(now)).collect())
    }

    async fn get_tradebook(&self) -> Result<Vec<TradebookEntry>, BrokerError> {
        self.gate()?;
        Ok(self.fills.lock().clone())
    }

    async fn get_funds(&self) -> Result<Funds, BrokerError> {
        self.gate()?;
        let balance = self.config.read().starting_balance;
        Ok(Funds {
            equity_available: balance,
            equity_used: Decimal::ZERO,
            total_balance: balance,
        })
    }

    async fn get_profile(&self) -> Result<Profile, BrokerError> {
        self.gate()?;
        Ok(Profile {
            user_id: "SIM001".into(),
            name: "Simulated Account".into(),
            email: None,
        })
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck, BrokerError> {
        self.gate()?;
        let now = now_ms();

        // Idempotency: an identical tag inside the window returns the
        // original ack instead of creating a second order.
        let window = self.config.read().idempotency_window_ms;
        if let Some(existing) = self.tags.get(&intent.client_tag) {
            if now - existing.1 <= window {
                return Ok(OrderAck {
                    broker_order_id: existing.0.clone(),
                    client_tag: intent.client_tag.clone(),
                });
            }
        }

        let market_price = self.price_of(&intent.symbol)?;
        if intent.quantity == 0 {
            return Err(BrokerError::Rejected {
                code: -50,
                message: "quantity must be positive".into(),
            });
        }

        let id = self.next_order_id();
        let mut order = SimOrder {
            broker_order_id: id.clone(),
            client_tag: intent.client_tag.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: intent.quantity,
            filled_qty: 0,
            avg_fill_price: None,
            status: BrokerOrderStatus::Accepted,
        };
        let _ = self.order_tx.send(order.to_update(now));

        let fill_mode = self.config.read().fill_mode;
        let marketable = Self::crosses(intent.side, &intent.order_type, market_price);
        match fill_mode {
            FillMode::Immediate if marketable => {
                let price = Self::fill_price(&intent.order_type, market_price);
                self.apply_fill(&mut order, intent.quantity, price, now);
            }
            FillMode::Partial(fraction) if marketable => {
                let fill_qty = (Decimal::from(intent.quantity) * fraction)
                    .floor()
                    .to_u32()
                    .unwrap_or(0);
                let price = Self::fill_price(&intent.order_type, market_price);
                self.apply_fill(&mut order, fill_qty, price, now);
            }
            _ => {}
        }

        self.orders.insert(id.clone(), order);
        self.tags.insert(intent.client_tag.clone(), (id.clone(), now));
        Ok(OrderAck {
            broker_order_id: id,
            client_tag: intent.client_tag.clone(),
        })
    }

    async fn modify_order(
        &self,
        broker_order_id: &str,
        changes: &OrderChanges,
    ) -> Result<(), BrokerError> {
        self.gate()?;
        let mut order = self
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.into()))?;
        if order.status.is_terminal() {
            return Err(BrokerError::Rejected {
                code: -90,
                message: "order already terminal".into(),
            });
        }
        if let Some(qty) = changes.quantity {
            order.quantity = qty;
        }
        order.order_type = match (order.order_type, changes.price, changes.trigger_price) {
            (BrokerOrderType::Limit(_), Some(price), _) => BrokerOrderType::Limit(price),
            (BrokerOrderType::StopMarket(_), _, Some(trigger)) => {
                BrokerOrderType::StopMarket(trigger)
            }
            (BrokerOrderType::StopLimit(_, limit), _, Some(trigger)) => {
                BrokerOrderType::StopLimit(trigger, limit)
            }
            (current, _, _) => current,
        };
        Ok(())
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        self.gate()?;
        let now = now_ms();
        let mut order = self
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.into()))?;
        if order.status == BrokerOrderStatus::Filled {
            return Err(BrokerError::Rejected {
                code: -91,
                message: "cannot cancel a filled order".into(),
            });
        }
        if order.status != BrokerOrderStatus::Cancelled {
            order.status = BrokerOrderStatus::Cancelled;
            let _ = self.order_tx.send(order.to_update(now));
        }
        Ok(())
    }

    async fn place_bracket_child(
        &self,
        parent_order_id: &str,
        side: OrderSide,
        order_type: BrokerOrderType,
        quantity: u32,
        client_tag: &str,
    ) -> Result<OrderAck, BrokerError> {
        let parent = self
            .orders
            .get(parent_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(parent_order_id.into()))?;
        let symbol = parent.symbol.clone();
        drop(parent);

        // Children rest until triggered; entry fill mode must not apply.
        let previous_mode = self.config.read().fill_mode;
        self.set_fill_mode(FillMode::Resting);
        let ack = self
            .place_order(&OrderIntent {
                symbol,
                side,
                order_type,
                quantity,
                product_type: model::ProductType::Intraday,
                client_tag: client_tag.into(),
            })
            .await;
        self.set_fill_mode(previous_mode);
        ack
    }

    async fn calc_margin(&self, intents: &[OrderIntent]) -> Result<MarginRequirement, BrokerError> {
        self.gate()?;
        let mut required = Decimal::ZERO;
        for intent in intents {
            let price = intent
                .order_type
                .working_price()
                .map(Ok)
                .unwrap_or_else(|| self.price_of(&intent.symbol))?;
            // Intraday leverage of 5x, per the venue's margin norms.
            required += price * Decimal::from(intent.quantity) / Decimal::from(5);
        }
        let available = self.config.read().starting_balance;
        Ok(MarginRequirement {
            total_required: required,
            available,
            shortfall: (required - available).max(Decimal::ZERO),
        })
    }

    fn subscribe_orders(&self) -> broadcast::Receiver<OrderUpdate> {
        self.order_tx.subscribe()
    }

    fn subscribe_market(&self, _symbols: &[Symbol]) -> broadcast::Receiver<MarketTick> {
        self.market_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("NSE:RELIANCE-EQ")
    }

    fn sim_with_price(price: Decimal) -> SimBroker {
        let sim = SimBroker::with_defaults();
        sim.set_price(&symbol(), price);
        sim
    }

    #[tokio::test]
    async fn test_market_order_fills_immediately() {
        let sim = sim_with_price(dec!(100.1));
        let intent = OrderIntent::market(symbol(), OrderSide::Buy, 500, "t1:entry");
        let ack = sim.place_order(&intent).await.unwrap();

        let orders = sim.get_orders().await.unwrap();
        let order = orders
            .iter()
            .find(|o| o.broker_order_id == ack.broker_order_id)
            .unwrap();
        assert_eq!(order.status, BrokerOrderStatus::Filled);
        assert_eq!(order.filled_qty, 500);
        assert_eq!(order.avg_fill_price, Some(dec!(100.1)));
    }

    #[tokio::test]
    async fn test_client_tag_idempotency() {
        let sim = sim_with_price(dec!(100));
        let intent = OrderIntent::market(symbol(), OrderSide::Buy, 10, "t1:entry");

        let first = sim.place_order(&intent).await.unwrap();
        let second = sim.place_order(&intent).await.unwrap();

        assert_eq!(first.broker_order_id, second.broker_order_id);
        assert_eq!(sim.order_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_fill_mode() {
        let sim = sim_with_price(dec!(100));
        sim.set_fill_mode(FillMode::Partial(dec!(0.6)));

        let intent = OrderIntent::market(symbol(), OrderSide::Buy, 500, "t1:entry");
        let ack = sim.place_order(&intent).await.unwrap();

        let orders = sim.get_orders().await.unwrap();
        let order = orders
            .iter()
            .find(|o| o.broker_order_id == ack.broker_order_id)
            .unwrap();
        assert_eq!(order.status, BrokerOrderStatus::PartiallyFilled);
        assert_eq!(order.filled_qty, 300);
    }

    #[tokio::test]
    async fn test_stop_child_triggers_on_price_cross() {
        let sim = sim_with_price(dec!(100));
        let entry = OrderIntent::market(symbol(), OrderSide::Buy, 100, "t1:entry");
        let entry_ack = sim.place_order(&entry).await.unwrap();

        let sl_ack = sim
            .place_bracket_child(
                &entry_ack.broker_order_id,
                OrderSide::Sell,
                BrokerOrderType::StopMarket(dec!(99)),
                100,
                "t1:sl",
            )
            .await
            .unwrap();

        // Price above the trigger: child still working.
        sim.set_price(&symbol(), dec!(100.5));
        let order = sim
            .orders_for(&symbol())
            .into_iter()
            .find(|o| o.broker_order_id == sl_ack.broker_order_id)
            .unwrap();
        assert_eq!(order.status, BrokerOrderStatus::Accepted);

        // Price crosses the trigger: child fills at the trigger.
        sim.set_price(&symbol(), dec!(98.8));
        let order = sim
            .orders_for(&symbol())
            .into_iter()
            .find(|o| o.broker_order_id == sl_ack.broker_order_id)
            .unwrap();
        assert_eq!(order.status, BrokerOrderStatus::Filled);
        assert_eq!(order.avg_fill_price, Some(dec!(99)));
    }

    #[tokio::test]
    async fn test_take_profit_limit_triggers_above() {
        let sim = sim_with_price(dec!(100));
        let entry = OrderIntent::market(symbol(), OrderSide::Buy, 100, "t1:entry");
        let entry_ack = sim.place_order(&entry).await.unwrap();

        let tp_ack = sim
            .place_bracket_child(
                &entry_ack.broker_order_id,
                OrderSide::Sell,
                BrokerOrderType::Limit(dec!(101.2)),
                100,
                "t1:tp",
            )
            .await
            .unwrap();

        sim.set_price(&symbol(), dec!(101.3));
        let order = sim
            .orders_for(&symbol())
            .into_iter()
            .find(|o| o.broker_order_id == tp_ack.broker_order_id)
            .unwrap();
        assert_eq!(order.status, BrokerOrderStatus::Filled);
        assert_eq!(order.avg_fill_price, Some(dec!(101.2)));
    }

    #[tokio::test]
    async fn test_cancel_and_modify() {
        let sim = sim_with_price(dec!(100));
        sim.set_fill_mode(FillMode::Resting);
        let intent = OrderIntent::limit(symbol(), OrderSide::Buy, 100, dec!(99), "t1:entry");
        let ack = sim.place_order(&intent).await.unwrap();

        sim.modify_order(&ack.broker_order_id, &OrderChanges::trigger(dec!(98)))
            .await
            .unwrap();
        sim.cancel_order(&ack.broker_order_id).await.unwrap();

        let orders = sim.get_orders().await.unwrap();
        assert_eq!(orders[0].status, BrokerOrderStatus::Cancelled);
        assert!(sim
            .cancel_order("SIM-404")
            .await
            .is_err_and(|e| matches!(e, BrokerError::UnknownOrder(_))));
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected() {
        let sim = SimBroker::with_defaults();
        let err = sim
            .get_quotes(&[Symbol::new("NSE:NOPE-EQ")])
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidSymbol(_)));
    }

    #[tokio::test]
    async fn test_injected_fault_surfaces_once() {
        let sim = sim_with_price(dec!(100));
        sim.inject_fault(BrokerError::AuthExpired);

        let err = sim.get_quotes(&[symbol()]).await.unwrap_err();
        assert!(matches!(err, BrokerError::AuthExpired));
        assert!(sim.get_quotes(&[symbol()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_order_updates_broadcast() {
        let sim = sim_with_price(dec!(100));
        let mut rx = sim.subscribe_orders();

        let intent = OrderIntent::market(symbol(), OrderSide::Buy, 10, "t1:entry");
        sim.place_order(&intent).await.unwrap();

        let accepted = rx.recv().await.unwrap();
        assert_eq!(accepted.status, BrokerOrderStatus::Accepted);
        let filled = rx.recv().await.unwrap();
        assert_eq!(filled.status, BrokerOrderStatus::Filled);
    }
}
