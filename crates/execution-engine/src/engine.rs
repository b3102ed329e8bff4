//! Per-order lifecycle driver.

use crate::{ExecutionConfig, ExecutionReport, OrderResult, TradeCommand};
use async_trait::async_trait;
use broker_core::{
    Broker, BrokerError, BrokerOrderStatus, BrokerOrderType, OrderChanges, OrderIntent, OrderSide,
    OrderUpdate, SharedBroker,
};
use common::ExponentialBackoff;
use dashmap::DashMap;
use model::{ApprovedOrder, EntryType, ExitReason, Trade, TradeStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::sleep;
use trade_ledger::{LedgerError, TradeLedger};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Engine-level failures (per-order failures are reported, not raised).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ledger access failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The auth recovery path could not restore a valid token.
    #[error("auth recovery failed")]
    AuthRecoveryFailed,

    /// A broker call failed beyond its retry budget.
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    /// Command referenced a trade the ledger does not know.
    #[error("unknown trade: {0}")]
    UnknownTrade(String),

    /// Command is not applicable in the trade's current state.
    #[error("trade {trade_id} not modifiable in state {state:?}")]
    NotModifiable {
        trade_id: String,
        state: TradeStatus,
    },
}

/// Hook the engine pauses on when the broker reports `AUTH_EXPIRED`.
#[async_trait]
pub trait AuthRecovery: Send + Sync {
    /// Attempt to restore a valid token. Return `true` once calls may
    /// resume.
    async fn recover(&self) -> bool;
}

/// Default recovery that never succeeds (no token lifecycle wired).
pub struct NoAuthRecovery;

#[async_trait]
impl AuthRecovery for NoAuthRecovery {
    async fn recover(&self) -> bool {
        false
    }
}

/// The execution engine.
pub struct ExecutionEngine {
    broker: SharedBroker,
    ledger: Arc<TradeLedger>,
    config: ExecutionConfig,
    auth: Arc<dyn AuthRecovery>,
    /// Consecutive bracket failures per trade.
    bracket_failures: DashMap<String, u32>,
    /// Exit reason to apply when a pending close order fills.
    pending_close_reasons: DashMap<String, ExitReason>,
}

impl ExecutionEngine {
    /// Engine over a broker and ledger.
    pub fn new(
        broker: SharedBroker,
        ledger: Arc<TradeLedger>,
        config: ExecutionConfig,
        auth: Arc<dyn AuthRecovery>,
    ) -> Self {
        Self {
            broker,
            ledger,
            config,
            auth,
            bracket_failures: DashMap::new(),
            pending_close_reasons: DashMap::new(),
        }
    }

    /// The ledger this engine writes.
    pub fn ledger(&self) -> &Arc<TradeLedger> {
        &self.ledger
    }

    /// Execute a batch of approved orders for a session date.
    ///
    /// An empty batch is a valid outcome and completes with zero trades.
    pub async fn execute_batch(
        &self,
        session_date: &str,
        orders: &[ApprovedOrder],
    ) -> Result<ExecutionReport, EngineError> {
        let mut report = ExecutionReport::default();
        if orders.is_empty() {
            info!(session_date, "empty approved set, nothing to execute");
            return Ok(report);
        }

        let orders = self.fit_to_margin(orders, &mut report).await;

        for order in orders {
            let result = self.execute_one(session_date, &order).await?;
            report.results.push(result);
        }

        info!(
            session_date,
            live = report.live_count(),
            failed = report.failed_count(),
            "execution batch complete"
        );
        Ok(report)
    }

    /// Drop lowest-conviction orders until the broker's margin calculator
    /// accepts the batch. Approved orders arrive conviction-sorted.
    async fn fit_to_margin(
        &self,
        orders: &[ApprovedOrder],
        report: &mut ExecutionReport,
    ) -> Vec<ApprovedOrder> {
        let mut kept: Vec<ApprovedOrder> = orders.to_vec();
        loop {
            if kept.is_empty() {
                return kept;
            }
            let intents: Vec<OrderIntent> = kept
                .iter()
                .map(|o| self.entry_intent(o, "margin-probe"))
                .collect();
            match self.broker.calc_margin(&intents).await {
                Ok(margin) if margin.is_sufficient() => return kept,
                Ok(margin) => {
                    let dropped = kept.pop();
                    if let Some(dropped) = dropped {
                        warn!(
                            symbol = %dropped.symbol,
                            shortfall = %margin.shortfall,
                            "margin shortfall, dropping lowest-conviction order"
                        );
                        report.dropped_for_margin.push(dropped.symbol);
                    }
                }
                Err(e) => {
                    // Margin preview is advisory; the broker will still
                    // reject orders it cannot carry.
                    warn!(error = %e, "margin calculation unavailable, proceeding");
                    return kept;
                }
            }
        }
    }

    async fn execute_one(
        &self,
        session_date: &str,
        order: &ApprovedOrder,
    ) -> Result<OrderResult, EngineError> {
        let trade_id = Uuid::new_v4().to_string();
        let trade = Trade::from_approved(&trade_id, session_date, order.clone(), now_ms());
        self.ledger.insert(trade)?;

        let intent = self.entry_intent(order, &format!("{trade_id}:entry"));
        let ack = match self.place_with_retry(&intent).await {
            Ok(ack) => ack,
            Err(e) if is_order_fatal(&e) => {
                self.ledger
                    .transition(&trade_id, TradeStatus::Rejected, e.to_string(), now_ms())?;
                return Ok(OrderResult {
                    trade_id,
                    symbol: order.symbol.clone(),
                    status: TradeStatus::Rejected,
                    filled_qty: 0,
                    message: Some(e.to_string()),
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.ledger.update(&trade_id, |t| {
            t.entry_order_id = Some(ack.broker_order_id.clone());
        })?;
        self.ledger
            .transition(&trade_id, TradeStatus::Working, "entry accepted", now_ms())?;

        // Wait for the entry fill inside the configured window.
        let filled = self
            .wait_for_entry_fill(&ack.broker_order_id, order.quantity)
            .await?;

        if filled.filled_qty == 0 {
            // Nothing filled: cancel the remainder and expire.
            let _ = self.broker.cancel_order(&ack.broker_order_id).await;
            self.ledger
                .transition(&trade_id, TradeStatus::Expired, "no fill in window", now_ms())?;
            return Ok(OrderResult {
                trade_id,
                symbol: order.symbol.clone(),
                status: TradeStatus::Expired,
                filled_qty: 0,
                message: Some("entry unfilled at deadline".into()),
            });
        }

        if filled.filled_qty < order.quantity {
            // Partial at the deadline: keep what we have, cancel the rest.
            if let Err(e) = self.broker.cancel_order(&ack.broker_order_id).await {
                warn!(error = %e, "failed to cancel unfilled remainder");
            }
            info!(
                trade_id = %trade_id,
                filled = filled.filled_qty,
                requested = order.quantity,
                "partial entry fill, proceeding on filled quantity"
            );
        }

        let fill_price = filled.avg_fill_price.unwrap_or(order.entry_price);
        self.ledger.update(&trade_id, |t| {
            t.filled_qty = filled.filled_qty;
            t.remaining_qty = filled.filled_qty;
            t.entry_fill_price = Some(fill_price);
            t.entry_time_ms = Some(now_ms());
        })?;
        self.ledger
            .transition(&trade_id, TradeStatus::Open, "entry filled", now_ms())?;

        self.place_brackets(&trade_id).await?;

        let trade = self
            .ledger
            .get(&trade_id)
            .ok_or_else(|| EngineError::UnknownTrade(trade_id.clone()))?;
        Ok(OrderResult {
            trade_id,
            symbol: order.symbol.clone(),
            status: trade.status,
            filled_qty: trade.filled_qty,
            message: None,
        })
    }

    fn entry_intent(&self, order: &ApprovedOrder, client_tag: &str) -> OrderIntent {
        let side = OrderSide::entry_for(order.direction);
        let order_type = match order.entry_type {
            EntryType::Market => BrokerOrderType::Market,
            EntryType::Limit => BrokerOrderType::Limit(order.entry_price),
        };
        OrderIntent {
            symbol: order.symbol.clone(),
            side,
            order_type,
            quantity: order.quantity,
            product_type: order.product_type,
            client_tag: client_tag.to_string(),
        }
    }

    /// Place an order with bounded backoff, pausing for token recovery on
    /// `AUTH_EXPIRED`. Retries are safe because the client tag is stable.
    async fn place_with_retry(
        &self,
        intent: &OrderIntent,
    ) -> Result<broker_core::OrderAck, BrokerError> {
        let mut backoff = ExponentialBackoff::default();
        let mut auth_recovered = false;
        loop {
            match self.broker.place_order(intent).await {
                Ok(ack) => return Ok(ack),
                Err(BrokerError::AuthExpired) if !auth_recovered => {
                    warn!("auth expired mid-batch, pausing for token recovery");
                    if !self.auth.recover().await {
                        return Err(BrokerError::AuthExpired);
                    }
                    auth_recovered = true;
                }
                Err(e) if e.is_retryable() => {
                    let delay = match e.retry_after_ms() {
                        Some(hint) => backoff.next_delay_after(hint),
                        None => backoff.next_delay(),
                    };
                    match delay {
                        Some(delay) => {
                            warn!(error = %e, delay_ms = delay.as_millis() as u64, "retrying placement");
                            sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll the broker for the entry's fill state until fully filled,
    /// terminal, or the wait window closes.
    async fn wait_for_entry_fill(
        &self,
        broker_order_id: &str,
        required_qty: u32,
    ) -> Result<FillState, EngineError> {
        let deadline = Instant::now() + self.config.fill_wait;
        loop {
            let state = self.fill_state(broker_order_id).await?;
            if state.terminal || state.filled_qty >= required_qty {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Ok(state);
            }
            sleep(self.config.poll_interval).await;
        }
    }

    async fn fill_state(&self, broker_order_id: &str) -> Result<FillState, EngineError> {
        let orders = self.broker.get_orders().await?;
        let order = orders
            .iter()
            .find(|o| o.broker_order_id == broker_order_id);
        Ok(match order {
            Some(o) => FillState {
                filled_qty: o.filled_qty,
                avg_fill_price: o.avg_fill_price,
                terminal: o.status.is_terminal(),
            },
            None => FillState {
                filled_qty: 0,
                avg_fill_price: None,
                terminal: false,
            },
        })
    }

    /// Place SL and TP children for an open trade. Two consecutive
    /// failures escalate to a forced close.
    pub async fn place_brackets(&self, trade_id: &str) -> Result<(), EngineError> {
        let trade = self
            .ledger
            .get(trade_id)
            .ok_or_else(|| EngineError::UnknownTrade(trade_id.into()))?;
        if trade.status != TradeStatus::Open || trade.remaining_qty == 0 {
            return Ok(());
        }
        let Some(entry_order_id) = trade.entry_order_id.clone() else {
            return Ok(());
        };
        let exit_side = OrderSide::exit_for(trade.direction());

        if trade.sl_order_id.is_none() {
            let placed = self
                .broker
                .place_bracket_child(
                    &entry_order_id,
                    exit_side,
                    BrokerOrderType::StopMarket(trade.current_stop),
                    trade.remaining_qty,
                    &format!("{trade_id}:sl"),
                )
                .await;
            match placed {
                Ok(ack) => {
                    self.ledger
                        .update(trade_id, |t| t.sl_order_id = Some(ack.broker_order_id.clone()))?;
                    self.bracket_failures.remove(trade_id);
                }
                Err(e) => return self.record_bracket_failure(trade_id, e).await,
            }
        }

        if trade.tp_order_id.is_none() {
            let placed = self
                .broker
                .place_bracket_child(
                    &entry_order_id,
                    exit_side,
                    BrokerOrderType::Limit(trade.approved_order.take_profit),
                    trade.remaining_qty,
                    &format!("{trade_id}:tp"),
                )
                .await;
            match placed {
                Ok(ack) => {
                    self.ledger
                        .update(trade_id, |t| t.tp_order_id = Some(ack.broker_order_id.clone()))?;
                    self.bracket_failures.remove(trade_id);
                }
                Err(e) => return self.record_bracket_failure(trade_id, e).await,
            }
        }

        Ok(())
    }

    async fn record_bracket_failure(
        &self,
        trade_id: &str,
        error: BrokerError,
    ) -> Result<(), EngineError> {
        let failures = {
            let mut entry = self.bracket_failures.entry(trade_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        warn!(trade_id, failures, error = %error, "bracket placement failed");
        if failures >= self.config.bracket_failure_limit {
            error!(trade_id, "bracket failures exhausted, forcing close");
            self.apply_command(&TradeCommand::Close {
                trade_id: trade_id.to_string(),
                reason: ExitReason::RiskGuard,
                rationale: "unprotected position: bracket placement failed twice".into(),
            })
            .await?;
        }
        Ok(())
    }

    /// Apply one monitor command. The monitor can only modify or close
    /// existing positions; nothing here opens one.
    pub async fn apply_command(&self, command: &TradeCommand) -> Result<(), EngineError> {
        let trade = self
            .ledger
            .get(command.trade_id())
            .ok_or_else(|| EngineError::UnknownTrade(command.trade_id().into()))?;
        if !trade.status.is_live() {
            return Err(EngineError::NotModifiable {
                trade_id: trade.trade_id.clone(),
                state: trade.status,
            });
        }

        match command {
            TradeCommand::ModifyStop {
                trade_id,
                new_stop,
                rationale,
            } => {
                if let Some(sl_order_id) = &trade.sl_order_id {
                    self.broker
                        .modify_order(sl_order_id, &OrderChanges::trigger(*new_stop))
                        .await?;
                }
                self.ledger
                    .move_stop(trade_id, *new_stop, rationale.clone(), now_ms())?;
            }
            TradeCommand::PartialExit {
                trade_id,
                quantity,
                rationale,
            } => {
                let quantity = (*quantity).min(trade.remaining_qty);
                if quantity == 0 {
                    return Ok(());
                }
                let intent = OrderIntent::market(
                    trade.symbol().clone(),
                    OrderSide::exit_for(trade.direction()),
                    quantity,
                    format!("{trade_id}:harvest:{}", trade.remaining_qty),
                );
                let ack = self.place_with_retry(&intent).await?;
                let price = self.exit_fill_price(&ack.broker_order_id).await?;
                self.ledger
                    .record_partial_exit(trade_id, quantity, price, now_ms())?;
                self.ledger.rationale(trade_id, rationale.clone(), now_ms())?;
                self.resize_children(&trade, trade.remaining_qty - quantity).await;
            }
            TradeCommand::Close {
                trade_id,
                reason,
                rationale,
            } => {
                self.pending_close_reasons
                    .insert(trade_id.clone(), reason.clone());
                // Children first so the close cannot race a stop fill.
                for child in [&trade.sl_order_id, &trade.tp_order_id].into_iter().flatten() {
                    let _ = self.broker.cancel_order(child).await;
                }
                let intent = OrderIntent::market(
                    trade.symbol().clone(),
                    OrderSide::exit_for(trade.direction()),
                    trade.remaining_qty,
                    format!("{trade_id}:close"),
                );
                let ack = self.place_with_retry(&intent).await?;
                if trade.status == TradeStatus::Open {
                    self.ledger
                        .transition(trade_id, TradeStatus::Closing, rationale.clone(), now_ms())?;
                }
                // If the close filled synchronously, finalize now.
                let orders = self.broker.get_orders().await?;
                if let Some(update) = orders
                    .into_iter()
                    .find(|o| o.broker_order_id == ack.broker_order_id)
                {
                    if update.status == BrokerOrderStatus::Filled {
                        self.finalize_close(&trade.trade_id, &update)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply a batch of monitor commands, deterministically, continuing
    /// past per-trade failures.
    pub async fn apply_commands(&self, commands: &[TradeCommand]) -> Vec<Result<(), EngineError>> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.apply_command(command).await;
            if let Err(e) = &result {
                warn!(trade_id = command.trade_id(), error = %e, "monitor command failed");
            }
            results.push(result);
        }
        results
    }

    async fn exit_fill_price(&self, broker_order_id: &str) -> Result<Decimal, EngineError> {
        let orders = self.broker.get_orders().await?;
        orders
            .iter()
            .find(|o| o.broker_order_id == broker_order_id)
            .and_then(|o| o.avg_fill_price)
            .ok_or_else(|| {
                EngineError::Broker(BrokerError::UnknownOrder(broker_order_id.to_string()))
            })
    }

    async fn resize_children(&self, trade: &Trade, new_qty: u32) {
        for child in [&trade.sl_order_id, &trade.tp_order_id].into_iter().flatten() {
            let changes = OrderChanges {
                quantity: Some(new_qty),
                ..OrderChanges::default()
            };
            if let Err(e) = self.broker.modify_order(child, &changes).await {
                warn!(child, error = %e, "failed to resize bracket child");
            }
        }
    }

    /// Reconcile ledger state against one broker order update.
    ///
    /// Idempotent on `(order_id, status, filled_qty)`; at-least-once
    /// delivery from the port is safe.
    pub fn on_order_update(&self, update: &OrderUpdate) -> Result<(), EngineError> {
        let Some((trade_id, purpose)) = parse_tag(&update.client_tag) else {
            return Ok(());
        };
        let Some(trade) = self.ledger.get(&trade_id) else {
            return Ok(());
        };

        match purpose {
            "entry" => self.reconcile_entry(&trade, update)?,
            "sl" => {
                if update.status == BrokerOrderStatus::Filled
                    && !trade.status.is_terminal()
                {
                    let price = update.avg_fill_price.unwrap_or(trade.current_stop);
                    if trade.status == TradeStatus::Open {
                        self.ledger.transition(
                            &trade_id,
                            TradeStatus::Closing,
                            "stop triggered",
                            update.timestamp_ms,
                        )?;
                    }
                    self.ledger
                        .record_exit(&trade_id, price, ExitReason::StopLoss, update.timestamp_ms)?;
                    self.ledger.transition(
                        &trade_id,
                        TradeStatus::StoppedOut,
                        "stop filled",
                        update.timestamp_ms,
                    )?;
                    self.cancel_sibling(&trade, &trade.tp_order_id);
                }
            }
            "tp" => {
                if update.status == BrokerOrderStatus::Filled
                    && !trade.status.is_terminal()
                {
                    let price = update
                        .avg_fill_price
                        .unwrap_or(trade.approved_order.take_profit);
                    if trade.status == TradeStatus::Open {
                        self.ledger.transition(
                            &trade_id,
                            TradeStatus::Closing,
                            "target touched",
                            update.timestamp_ms,
                        )?;
                    }
                    self.ledger
                        .record_exit(&trade_id, price, ExitReason::TakeProfit, update.timestamp_ms)?;
                    self.ledger.transition(
                        &trade_id,
                        TradeStatus::Closed,
                        "target filled",
                        update.timestamp_ms,
                    )?;
                    self.cancel_sibling(&trade, &trade.sl_order_id);
                }
            }
            "close" => {
                if update.status == BrokerOrderStatus::Filled && !trade.status.is_terminal() {
                    self.finalize_close(&trade_id, update)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finalize_close(&self, trade_id: &str, update: &OrderUpdate) -> Result<(), EngineError> {
        let trade = self
            .ledger
            .get(trade_id)
            .ok_or_else(|| EngineError::UnknownTrade(trade_id.into()))?;
        if trade.status.is_terminal() {
            return Ok(());
        }
        let reason = self
            .pending_close_reasons
            .remove(trade_id)
            .map(|(_, r)| r)
            .unwrap_or(ExitReason::MonitorClose);
        let price = update
            .avg_fill_price
            .unwrap_or(trade.approved_order.entry_price);
        if trade.status == TradeStatus::Open {
            self.ledger.transition(
                trade_id,
                TradeStatus::Closing,
                "close order filled",
                update.timestamp_ms,
            )?;
        }
        self.ledger
            .record_exit(trade_id, price, reason, update.timestamp_ms)?;
        self.ledger.transition(
            trade_id,
            TradeStatus::Closed,
            "close complete",
            update.timestamp_ms,
        )?;
        Ok(())
    }

    fn reconcile_entry(&self, trade: &Trade, update: &OrderUpdate) -> Result<(), EngineError> {
        match update.status {
            BrokerOrderStatus::Rejected => {
                if matches!(trade.status, TradeStatus::Pending | TradeStatus::Working) {
                    self.ledger.transition(
                        &trade.trade_id,
                        TradeStatus::Rejected,
                        update
                            .message
                            .clone()
                            .unwrap_or_else(|| "broker rejected entry".into()),
                        update.timestamp_ms,
                    )?;
                }
            }
            BrokerOrderStatus::PartiallyFilled | BrokerOrderStatus::Filled => {
                if update.filled_qty > trade.filled_qty {
                    let exited = trade.filled_qty.saturating_sub(trade.remaining_qty);
                    self.ledger.update(&trade.trade_id, |t| {
                        t.filled_qty = update.filled_qty;
                        t.remaining_qty = update.filled_qty.saturating_sub(exited);
                        if t.entry_fill_price.is_none() {
                            t.entry_fill_price = update.avg_fill_price;
                            t.entry_time_ms = Some(update.timestamp_ms);
                        }
                    })?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn cancel_sibling(&self, trade: &Trade, sibling: &Option<String>) {
        if let Some(id) = sibling {
            let broker = self.broker.clone();
            let id = id.clone();
            let trade_id = trade.trade_id.clone();
            tokio::spawn(async move {
                if let Err(e) = broker.cancel_order(&id).await {
                    warn!(trade_id = %trade_id, error = %e, "failed to cancel sibling bracket");
                }
            });
        }
    }

    /// Full reconciliation pass: broker truth wins.
    ///
    /// Pulls today's orders from the broker and replays them through the
    /// update path; any correction leaves an audit entry on the trade.
    pub async fn reconcile(&self, session_date: &str) -> Result<u32, EngineError> {
        let updates = self.broker.get_orders().await?;
        let mut corrections = 0;
        for update in &updates {
            let Some((trade_id, _)) = parse_tag(&update.client_tag) else {
                continue;
            };
            let before = self.ledger.get(&trade_id).map(|t| (t.status, t.filled_qty));
            self.on_order_update(update)?;
            let after = self.ledger.get(&trade_id).map(|t| (t.status, t.filled_qty));
            if before != after {
                corrections += 1;
                self.ledger.audit(
                    &trade_id,
                    format!(
                        "reconciled against broker order {}: {:?} -> {:?}",
                        update.broker_order_id, before, after
                    ),
                    now_ms(),
                )?;
            }
        }
        // Open trades whose brackets went missing get them re-placed.
        for trade in self.ledger.live_trades(session_date) {
            if trade.status == TradeStatus::Open {
                self.place_brackets(&trade.trade_id).await?;
            }
        }
        Ok(corrections)
    }
}

struct FillState {
    filled_qty: u32,
    avg_fill_price: Option<Decimal>,
    terminal: bool,
}

/// Failures that reject the one order but let the batch continue.
fn is_order_fatal(error: &BrokerError) -> bool {
    matches!(
        error,
        BrokerError::InvalidSymbol(_) | BrokerError::Rejected { .. }
    )
}

fn parse_tag(tag: &str) -> Option<(String, &str)> {
    let (trade_id, purpose) = tag.split_once(':')?;
    Some((trade_id.to_string(), purpose))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
