//! The REST broker client.

use crate::http::HttpClient;
use crate::responses::{
    ChainPayload, DepthPayload, Envelope, FundsPayload, HistoryPayload, HoldingsPayload,
    MarginPayload, OrdersPayload, PlaceOrderPayload, PositionsPayload, ProfilePayload,
    QuotesPayload, TradebookPayload,
};
use async_trait::async_trait;
use auth::{AuthError, AuthFlow, Token};
use broker_core::{
    Broker, BrokerError, BrokerOrderType, Candle, Depth, Funds, HistoryRequest, Holding,
    MarginRequirement, MarketTick, OptionStrike, OrderAck, OrderChanges, OrderIntent, OrderSide,
    OrderUpdate, PositionSnapshot, Profile, Quote, RateLimitConfig, TradebookEntry,
};
use model::Symbol;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct RestBrokerConfig {
    /// API base URL.
    pub base_url: String,
    /// Application id prefixed to the auth header.
    pub app_id: String,
    /// Client-tag idempotency window (ms).
    pub idempotency_window_ms: i64,
    /// Poll cadence for the subscription poller.
    pub poll_interval: Duration,
    pub rate_limits: RateLimitConfig,
}

impl Default for RestBrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fyers.in".into(),
            app_id: String::new(),
            idempotency_window_ms: 60_000,
            poll_interval: Duration::from_secs(5),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

/// Supplies the current access token; backed by the token lifecycle.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token, when one is loaded.
    async fn access_token(&self) -> Option<String>;
}

/// Broker port over authenticated REST.
pub struct RestBroker {
    http: HttpClient,
    config: RestBrokerConfig,
    token: Arc<dyn TokenSource>,
    order_tx: broadcast::Sender<OrderUpdate>,
    market_tx: broadcast::Sender<MarketTick>,
    /// Last seen (status, filled) per order id, for the poll differ.
    seen_orders: Mutex<HashMap<String, (broker_core::BrokerOrderStatus, u32)>>,
    /// client_tag -> (order id, placed_at_ms).
    tags: Mutex<HashMap<String, (String, i64)>>,
    /// Symbols the market poller watches.
    watched: Mutex<HashSet<Symbol>>,
}

impl RestBroker {
    /// Client over the given config and token source.
    pub fn new(
        config: RestBrokerConfig,
        token: Arc<dyn TokenSource>,
    ) -> Result<Self, BrokerError> {
        let http = HttpClient::new(&config.base_url, config.rate_limits.clone())?;
        let (order_tx, _) = broadcast::channel(256);
        let (market_tx, _) = broadcast::channel(1024);
        Ok(Self {
            http,
            config,
            token,
            order_tx,
            market_tx,
            seen_orders: Mutex::new(HashMap::new()),
            tags: Mutex::new(HashMap::new()),
            watched: Mutex::new(HashSet::new()),
        })
    }

    async fn auth_header(&self) -> Result<String, BrokerError> {
        let token = self
            .token
            .access_token()
            .await
            .ok_or(BrokerError::AuthExpired)?;
        Ok(format!("{}:{}", self.config.app_id, token))
    }

    /// Spawn the poll-backed subscription feeder. At-least-once delivery:
    /// a restart may re-broadcast the latest state of every order.
    pub fn start_pollers(self: &Arc<Self>) {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(broker.config.poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = broker.poll_once().await {
                    warn!(error = %e, "subscription poll failed");
                }
            }
        });
        info!(interval = ?self.config.poll_interval, "subscription pollers started");
    }

    async fn poll_once(&self) -> Result<(), BrokerError> {
        let updates = self.get_orders().await?;
        for update in updates {
            let changed = {
                let mut seen = self.seen_orders.lock();
                let key = update.broker_order_id.clone();
                let entry = (update.status, update.filled_qty);
                seen.insert(key, entry) != Some(entry)
            };
            if changed {
                let _ = self.order_tx.send(update);
            }
        }

        let symbols: Vec<Symbol> = self.watched.lock().iter().cloned().collect();
        if !symbols.is_empty() {
            for quote in self.get_quotes(&symbols).await? {
                let _ = self.market_tx.send(MarketTick {
                    symbol: quote.symbol,
                    last_price: quote.last_price,
                    volume: quote.volume,
                    timestamp_ms: quote.timestamp_ms,
                });
            }
        }
        Ok(())
    }
}

/// Order request body for the brokerage's order endpoint.
fn intent_body(intent: &OrderIntent) -> serde_json::Value {
    let (order_type, limit_price, stop_price) = match intent.order_type {
        BrokerOrderType::Limit(price) => (1, price, Decimal::ZERO),
        BrokerOrderType::Market => (2, Decimal::ZERO, Decimal::ZERO),
        BrokerOrderType::StopMarket(trigger) => (3, Decimal::ZERO, trigger),
        BrokerOrderType::StopLimit(trigger, price) => (4, price, trigger),
    };
    json!({
        "symbol": intent.symbol.as_str(),
        "qty": intent.quantity,
        "type": order_type,
        "side": match intent.side { OrderSide::Buy => 1, OrderSide::Sell => -1 },
        "productType": intent.product_type.as_str(),
        "limitPrice": limit_price,
        "stopPrice": stop_price,
        "validity": "DAY",
        "offlineOrder": false,
        "orderTag": intent.client_tag,
    })
}

#[async_trait]
impl Broker for RestBroker {
    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, BrokerError> {
        let header = self.auth_header().await?;
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let envelope: Envelope<QuotesPayload> = self
            .http
            .get("/data/quotes", Some(&format!("symbols={joined}")), Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .d
            .into_iter()
            .map(|row| row.into_quote())
            .collect())
    }

    async fn get_depth(&self, symbol: &Symbol) -> Result<Depth, BrokerError> {
        let header = self.auth_header().await?;
        let query = format!("symbol={}&ohlcv_flag=1", symbol.as_str());
        let envelope: Envelope<HashMap<String, DepthPayload>> = self
            .http
            .get("/data/depth", Some(&query), Some(&header))
            .await?;
        let mut payloads = envelope.into_result()?;
        let payload = payloads
            .remove(symbol.as_str())
            .ok_or_else(|| BrokerError::InvalidSymbol(symbol.to_string()))?;
        Ok(Depth {
            symbol: symbol.clone(),
            bids: payload.bids.into_iter().map(|r| r.into_level()).collect(),
            asks: payload.ask.into_iter().map(|r| r.into_level()).collect(),
            open: payload.o,
            high: payload.h,
            low: payload.l,
            close: payload.c,
            lower_circuit: payload.lower_ckt,
            upper_circuit: payload.upper_ckt,
        })
    }

    async fn get_history(&self, request: &HistoryRequest) -> Result<Vec<Candle>, BrokerError> {
        let header = self.auth_header().await?;
        let query = format!(
            "symbol={}&resolution={}&date_format=0&range_from={}&range_to={}&cont_flag=1&oi_flag={}",
            request.symbol.as_str(),
            request.resolution,
            request.from_ms / 1_000,
            request.to_ms / 1_000,
            u8::from(request.with_oi),
        );
        let envelope: Envelope<HistoryPayload> = self
            .http
            .get("/data/history", Some(&query), Some(&header))
            .await?;
        Ok(envelope.into_result()?.into_candles(request.with_oi))
    }

    async fn get_option_chain(
        &self,
        symbol: &Symbol,
        strike_count: u32,
    ) -> Result<Vec<OptionStrike>, BrokerError> {
        let header = self.auth_header().await?;
        let query = format!("symbol={}&strikecount={strike_count}", symbol.as_str());
        let envelope: Envelope<ChainPayload> = self
            .http
            .get("/data/options-chain-v3", Some(&query), Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .options_chain
            .into_iter()
            .map(|row| row.into_strike())
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<PositionsPayload> = self
            .http
            .get("/api/v3/positions", None, Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .net_positions
            .into_iter()
            .map(|row| row.into_snapshot())
            .collect())
    }

    async fn get_holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<HoldingsPayload> = self
            .http
            .get("/api/v3/holdings", None, Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .holdings
            .into_iter()
            .map(|row| row.into_holding())
            .collect())
    }

    async fn get_orders(&self) -> Result<Vec<OrderUpdate>, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<OrdersPayload> = self
            .http
            .get("/api/v3/orders", None, Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .order_book
            .into_iter()
            .map(|row| row.into_update())
            .collect())
    }

    async fn get_tradebook(&self) -> Result<Vec<TradebookEntry>, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<TradebookPayload> = self
            .http
            .get("/api/v3/tradebook", None, Some(&header))
            .await?;
        Ok(envelope
            .into_result()?
            .trade_book
            .into_iter()
            .map(|row| row.into_entry())
            .collect())
    }

    async fn get_funds(&self) -> Result<Funds, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<FundsPayload> =
            self.http.get("/api/v3/funds", None, Some(&header)).await?;
        Ok(envelope.into_result()?.into_funds())
    }

    async fn get_profile(&self) -> Result<Profile, BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<ProfilePayload> = self
            .http
            .get("/api/v3/profile", None, Some(&header))
            .await?;
        Ok(envelope.into_result()?.into_profile())
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<OrderAck, BrokerError> {
        // The venue has no native idempotency on tags, so the window is
        // enforced here.
        let now_ms = chrono::Utc::now().timestamp_millis();
        {
            let tags = self.tags.lock();
            if let Some((order_id, placed_at)) = tags.get(&intent.client_tag) {
                if now_ms - placed_at <= self.config.idempotency_window_ms {
                    return Ok(OrderAck {
                        broker_order_id: order_id.clone(),
                        client_tag: intent.client_tag.clone(),
                    });
                }
            }
        }

        let header = self.auth_header().await?;
        let envelope: Envelope<PlaceOrderPayload> = self
            .http
            .post("/api/v3/orders", intent_body(intent), Some(&header))
            .await?;
        let payload = envelope.into_result()?;
        self.tags
            .lock()
            .insert(intent.client_tag.clone(), (payload.id.clone(), now_ms));
        Ok(OrderAck {
            broker_order_id: payload.id,
            client_tag: intent.client_tag.clone(),
        })
    }

    async fn modify_order(
        &self,
        broker_order_id: &str,
        changes: &OrderChanges,
    ) -> Result<(), BrokerError> {
        if changes.is_empty() {
            return Ok(());
        }
        let header = self.auth_header().await?;
        let mut body = json!({ "id": broker_order_id });
        if let Some(price) = changes.price {
            body["limitPrice"] = json!(price);
        }
        if let Some(trigger) = changes.trigger_price {
            body["stopPrice"] = json!(trigger);
        }
        if let Some(qty) = changes.quantity {
            body["qty"] = json!(qty);
        }
        let envelope: Envelope<serde_json::Value> = self
            .http
            .patch("/api/v3/orders", body, Some(&header))
            .await?;
        envelope.into_result().map(|_| ())
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        let header = self.auth_header().await?;
        let envelope: Envelope<serde_json::Value> = self
            .http
            .delete(
                "/api/v3/orders",
                Some(json!({ "id": broker_order_id })),
                Some(&header),
            )
            .await?;
        envelope.into_result().map(|_| ())
    }

    async fn place_bracket_child(
        &self,
        parent_order_id: &str,
        side: OrderSide,
        order_type: BrokerOrderType,
        quantity: u32,
        client_tag: &str,
    ) -> Result<OrderAck, BrokerError> {
        // The venue has no linked bracket orders for this flow; children
        // are standalone protective orders on the parent's symbol,
        // correlated by tag.
        let orders = self.get_orders().await?;
        let parent = orders
            .into_iter()
            .find(|o| o.broker_order_id == parent_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(parent_order_id.to_string()))?;
        self.place_order(&OrderIntent {
            symbol: parent.symbol,
            side,
            order_type,
            quantity,
            product_type: model::ProductType::Intraday,
            client_tag: client_tag.to_string(),
        })
        .await
    }

    async fn calc_margin(&self, intents: &[OrderIntent]) -> Result<MarginRequirement, BrokerError> {
        let header = self.auth_header().await?;
        let body = json!({
            "data": intents.iter().map(intent_body).collect::<Vec<_>>(),
        });
        let envelope: Envelope<MarginPayload> = self
            .http
            .post("/api/v3/multiorder/margin", body, Some(&header))
            .await?;
        let payload = envelope.into_result()?;
        Ok(MarginRequirement {
            total_required: payload.margin_total,
            available: payload.margin_avail,
            shortfall: (payload.margin_total - payload.margin_avail).max(Decimal::ZERO),
        })
    }

    fn subscribe_orders(&self) -> broadcast::Receiver<OrderUpdate> {
        self.order_tx.subscribe()
    }

    fn subscribe_market(&self, symbols: &[Symbol]) -> broadcast::Receiver<MarketTick> {
        self.watched.lock().extend(symbols.iter().cloned());
        self.market_tx.subscribe()
    }
}

/// Auth flow against the brokerage's token endpoints.
pub struct RestAuthFlow {
    http: HttpClient,
    app_id: String,
    /// SHA-256 of `app_id:secret`, prepared by the operator tooling.
    app_id_hash: String,
    /// Refresh PIN, when the operator provided one; absent means the
    /// refresh path surfaces the interactive requirement.
    pin: Option<String>,
}

impl RestAuthFlow {
    /// Flow over the given API base.
    pub fn new(
        base_url: &str,
        app_id: impl Into<String>,
        app_id_hash: impl Into<String>,
        pin: Option<String>,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            http: HttpClient::new(base_url, RateLimitConfig::default())?,
            app_id: app_id.into(),
            app_id_hash: app_id_hash.into(),
            pin,
        })
    }
}

#[async_trait]
impl AuthFlow for RestAuthFlow {
    async fn probe(&self, access_token: &str) -> Result<(), AuthError> {
        let header = format!("{}:{access_token}", self.app_id);
        let result: Result<Envelope<ProfilePayload>, BrokerError> = self
            .http
            .get("/api/v3/profile", None, Some(&header))
            .await;
        match result.and_then(Envelope::into_result) {
            Ok(_) => Ok(()),
            Err(e) => Err(AuthError::ProbeFailed(e.to_string())),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let Some(pin) = &self.pin else {
            return Err(AuthError::InteractiveRequired);
        };
        let body = json!({
            "grant_type": "refresh_token",
            "appIdHash": self.app_id_hash,
            "refresh_token": refresh_token,
            "pin": pin,
        });
        #[derive(serde::Deserialize)]
        struct RefreshPayload {
            access_token: String,
        }
        let result: Result<Envelope<RefreshPayload>, BrokerError> = self
            .http
            .post("/api/v3/validate-refresh-token", body, None)
            .await;
        let payload = result
            .and_then(Envelope::into_result)
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let now = chrono::Utc::now().timestamp_millis();
        // Tokens are valid until the venue's next early-morning expiry;
        // twelve hours stays safely inside that.
        Ok(Token::new(
            payload.access_token,
            Some(refresh_token.to_string()),
            now,
            now + 12 * 3600 * 1_000,
            self.app_id.clone(),
            None,
        ))
    }
}
