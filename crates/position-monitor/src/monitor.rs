//! The per-tick monitor pass.

use crate::{cumulative_guard, decide, MonitorConfig, TradeSnapshot};
use broker_core::{Broker, BrokerError, HistoryRequest, SharedBroker};
use chrono::NaiveTime;
use execution_engine::TradeCommand;
use model::{NewsDigest, Symbol, Trade, TradeStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use trade_ledger::{LedgerError, TradeLedger};
use tracing::{info, warn};

/// Monitor failures.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Quotes are required; without them no decision is safe.
    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    /// Ledger access failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What one tick looked at and decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub open_trades: usize,
    pub commands: Vec<TradeCommand>,
    /// Trades skipped because no quote came back for their symbol.
    pub unpriced: Vec<String>,
}

/// Periodic control loop over open trades.
pub struct PositionMonitor {
    broker: SharedBroker,
    ledger: Arc<TradeLedger>,
    config: MonitorConfig,
}

impl PositionMonitor {
    /// Monitor over a broker and the trade ledger.
    pub fn new(broker: SharedBroker, ledger: Arc<TradeLedger>, config: MonitorConfig) -> Self {
        Self {
            broker,
            ledger,
            config,
        }
    }

    /// One monitoring pass. Returns the commands to route through the
    /// execution engine; applying them is the caller's job so the tick
    /// itself stays read-only.
    pub async fn tick(
        &self,
        session_date: &str,
        digest: Option<&NewsDigest>,
        now_local: NaiveTime,
        now_ms: i64,
    ) -> Result<MonitorSummary, MonitorError> {
        // Trades in deterministic trade-id order; only OPEN trades are
        // modifiable.
        let trades: Vec<Trade> = self
            .ledger
            .live_trades(session_date)
            .into_iter()
            .filter(|t| t.status == TradeStatus::Open)
            .collect();
        let mut summary = MonitorSummary {
            open_trades: trades.len(),
            ..MonitorSummary::default()
        };
        if trades.is_empty() {
            return Ok(summary);
        }

        let symbols: Vec<Symbol> = trades.iter().map(|t| t.symbol().clone()).collect();
        let quotes = self.broker.get_quotes(&symbols).await?;
        let prices: HashMap<Symbol, Decimal> = quotes
            .into_iter()
            .map(|q| (q.symbol.clone(), q.last_price))
            .collect();

        let mut snapshots = Vec::with_capacity(trades.len());
        for trade in trades {
            let Some(price) = prices.get(trade.symbol()).copied() else {
                warn!(trade_id = %trade.trade_id, symbol = %trade.symbol(), "no quote, skipping trade");
                summary.unpriced.push(trade.trade_id.clone());
                continue;
            };
            let atr = self.rolling_atr(trade.symbol(), now_ms).await;
            snapshots.push(TradeSnapshot { trade, price, atr });
        }

        let mut commands = Vec::new();
        for snapshot in &snapshots {
            let decided = decide(snapshot, digest, now_local, &self.config);
            for command in &decided {
                self.ledger.rationale(
                    snapshot.trade.trade_id.as_str(),
                    describe(command),
                    now_ms,
                )?;
            }
            commands.extend(decided);
        }

        // Guard against the stops as they will be after this tick's moves.
        let moved: HashMap<String, Decimal> = commands
            .iter()
            .filter_map(|c| match c {
                TradeCommand::ModifyStop { trade_id, new_stop, .. } => {
                    Some((trade_id.clone(), *new_stop))
                }
                _ => None,
            })
            .collect();
        let closing: Vec<String> = commands
            .iter()
            .filter_map(|c| match c {
                TradeCommand::Close { trade_id, .. } => Some(trade_id.clone()),
                _ => None,
            })
            .collect();
        let guarded: Vec<TradeSnapshot> = snapshots
            .iter()
            .filter(|s| !closing.contains(&s.trade.trade_id))
            .cloned()
            .collect();
        let realized = self.ledger.realized_pnl(session_date);
        let guard_commands = cumulative_guard(
            &guarded,
            &|t: &Trade| moved.get(&t.trade_id).copied().unwrap_or(t.current_stop),
            realized,
            &self.config,
        );
        for command in &guard_commands {
            self.ledger
                .rationale(command.trade_id(), describe(command), now_ms)?;
        }
        commands.extend(guard_commands);

        info!(
            session_date,
            open = summary.open_trades,
            commands = commands.len(),
            "monitor tick complete"
        );
        summary.commands = commands;
        Ok(summary)
    }

    /// Rolling ATR from recent candles; `None` when history is too thin.
    async fn rolling_atr(&self, symbol: &Symbol, now_ms: i64) -> Option<Decimal> {
        let lookback_ms =
            (self.config.atr_period as i64 + 10) * self.config.atr_resolution_min as i64 * 60_000;
        let request = HistoryRequest {
            symbol: symbol.clone(),
            resolution: self.config.atr_resolution_min.to_string(),
            from_ms: now_ms - lookback_ms,
            to_ms: now_ms,
            with_oi: false,
        };
        let candles = match self.broker.get_history(&request).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "history unavailable for ATR");
                return None;
            }
        };
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let series = indicators::atr(&high, &low, &close, self.config.atr_period);
        let last = *series.last()?;
        Decimal::try_from(last).ok()
    }
}

fn describe(command: &TradeCommand) -> String {
    match command {
        TradeCommand::ModifyStop { new_stop, rationale, .. } => {
            format!("modify stop -> {new_stop}: {rationale}")
        }
        TradeCommand::PartialExit { quantity, rationale, .. } => {
            format!("partial exit {quantity}: {rationale}")
        }
        TradeCommand::Close { reason, rationale, .. } => {
            format!("close ({}): {rationale}", reason.as_str())
        }
    }
}
