//! Per-batch execution reporting.

use model::{Symbol, TradeStatus};
use serde::{Deserialize, Serialize};

/// Outcome of one approved order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub trade_id: String,
    pub symbol: Symbol,
    pub status: TradeStatus,
    pub filled_qty: u32,
    /// Broker or policy message, populated on rejections and expiries.
    pub message: Option<String>,
}

/// Outcome of one execution batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: Vec<OrderResult>,
    /// Orders dropped before placement (margin shortfall).
    pub dropped_for_margin: Vec<Symbol>,
}

impl ExecutionReport {
    /// Trades that reached a live state.
    pub fn live_count(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_live()).count()
    }

    /// Trades rejected or expired.
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TradeStatus::Rejected | TradeStatus::Expired))
            .count()
    }
}
