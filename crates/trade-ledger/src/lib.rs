//! Durable trade ledger.
//!
//! The authoritative record of every trade from intent to terminal state.
//! Trades mutate only through declared state transitions, each transition
//! is journaled, and the ledger - not the broker - is what the rest of the
//! system reads. Broker truth is used to validate and correct, with an
//! audit entry whenever it wins.

use model::{ExitReason, Symbol, Trade, TradeStatus, ValidationError};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Trade id not present.
    #[error("unknown trade: {0}")]
    UnknownTrade(String),

    /// Trade id already present.
    #[error("duplicate trade: {0}")]
    DuplicateTrade(String),

    /// Transition not allowed by the lifecycle graph.
    #[error(transparent)]
    Transition(#[from] ValidationError),

    /// Persistence failure.
    #[error("ledger I/O error: {0}")]
    Io(String),

    /// Document format failure.
    #[error("ledger format error: {0}")]
    Format(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// What a journal line records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalKind {
    /// Lifecycle transition.
    Transition { from: TradeStatus, to: TradeStatus },
    /// Stop level moved (by the monitor or the engine).
    StopMoved { from: Decimal, to: Decimal },
    /// Part of the position booked.
    PartialExit { quantity: u32, price: Decimal },
    /// Reconciliation against broker truth corrected the trade.
    Audit,
    /// Monitor rationale attached to the trade.
    Rationale,
}

/// One journaled event against a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub trade_id: String,
    pub timestamp_ms: i64,
    pub kind: JournalKind,
    pub detail: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDoc {
    trades: BTreeMap<String, Trade>,
    journal: Vec<JournalEntry>,
}

/// The trade ledger. One writer at a time by construction of the schedule;
/// the mutex still guards the invariant against manual CLI runs.
pub struct TradeLedger {
    path: Option<PathBuf>,
    inner: Mutex<LedgerDoc>,
}

impl TradeLedger {
    /// Ledger persisted at `path`, loading the existing document if any.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let doc = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerDoc::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(doc),
        })
    }

    /// Volatile ledger for tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(LedgerDoc::default()),
        }
    }

    /// Register a new trade (must be `Pending`).
    pub fn insert(&self, trade: Trade) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        if doc.trades.contains_key(&trade.trade_id) {
            return Err(LedgerError::DuplicateTrade(trade.trade_id));
        }
        info!(trade_id = %trade.trade_id, symbol = %trade.symbol(), "trade registered");
        doc.trades.insert(trade.trade_id.clone(), trade);
        self.persist(&doc)
    }

    /// Move a trade through the lifecycle graph, journaling the step.
    pub fn transition(
        &self,
        trade_id: &str,
        to: TradeStatus,
        detail: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        let trade = doc
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LedgerError::UnknownTrade(trade_id.into()))?;
        let from = trade.status;
        trade.transition(to)?;
        doc.journal.push(JournalEntry {
            trade_id: trade_id.into(),
            timestamp_ms: now_ms,
            kind: JournalKind::Transition { from, to },
            detail: detail.into(),
        });
        debug!(trade_id, from = from.as_str(), to = to.as_str(), "trade transition");
        self.persist(&doc)
    }

    /// Apply an arbitrary field update outside the lifecycle graph
    /// (order ids, fill details). Status changes must use [`transition`].
    ///
    /// [`transition`]: TradeLedger::transition
    pub fn update<F>(&self, trade_id: &str, f: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut Trade),
    {
        let mut doc = self.inner.lock();
        let trade = doc
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LedgerError::UnknownTrade(trade_id.into()))?;
        let status_before = trade.status;
        f(trade);
        debug_assert_eq!(trade.status, status_before, "status must change via transition()");
        self.persist(&doc)
    }

    /// Move the effective stop, journaling old and new levels.
    pub fn move_stop(
        &self,
        trade_id: &str,
        new_stop: Decimal,
        rationale: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        let trade = doc
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LedgerError::UnknownTrade(trade_id.into()))?;
        let from = trade.current_stop;
        trade.current_stop = new_stop;
        doc.journal.push(JournalEntry {
            trade_id: trade_id.into(),
            timestamp_ms: now_ms,
            kind: JournalKind::StopMoved { from, to: new_stop },
            detail: rationale.into(),
        });
        self.persist(&doc)
    }

    /// Book a partial exit: reduce the position and accrue realized P&L.
    pub fn record_partial_exit(
        &self,
        trade_id: &str,
        quantity: u32,
        price: Decimal,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        let trade = doc
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LedgerError::UnknownTrade(trade_id.into()))?;
        let quantity = quantity.min(trade.remaining_qty);
        if let Some(entry) = trade.entry_fill_price {
            let qty = Decimal::from(quantity);
            let pnl = match trade.direction() {
                model::Direction::Long => (price - entry) * qty,
                model::Direction::Short => (entry - price) * qty,
            };
            trade.realized_pnl = Some(trade.realized_pnl.unwrap_or(Decimal::ZERO) + pnl);
        }
        trade.remaining_qty -= quantity;
        doc.journal.push(JournalEntry {
            trade_id: trade_id.into(),
            timestamp_ms: now_ms,
            kind: JournalKind::PartialExit { quantity, price },
            detail: String::new(),
        });
        self.persist(&doc)
    }

    /// Record the final exit fill on a trade already in a closing path.
    pub fn record_exit(
        &self,
        trade_id: &str,
        price: Decimal,
        reason: ExitReason,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        let trade = doc
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| LedgerError::UnknownTrade(trade_id.into()))?;
        let qty = Decimal::from(trade.remaining_qty);
        if let Some(entry) = trade.entry_fill_price {
            let pnl = match trade.direction() {
                model::Direction::Long => (price - entry) * qty,
                model::Direction::Short => (entry - price) * qty,
            };
            trade.realized_pnl = Some(trade.realized_pnl.unwrap_or(Decimal::ZERO) + pnl);
        }
        trade.remaining_qty = 0;
        trade.exit_fill_price = Some(price);
        trade.exit_time_ms = Some(now_ms);
        trade.exit_reason = Some(reason);
        self.persist(&doc)
    }

    /// Append a reconciliation audit entry.
    pub fn audit(
        &self,
        trade_id: &str,
        detail: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        if !doc.trades.contains_key(trade_id) {
            return Err(LedgerError::UnknownTrade(trade_id.into()));
        }
        doc.journal.push(JournalEntry {
            trade_id: trade_id.into(),
            timestamp_ms: now_ms,
            kind: JournalKind::Audit,
            detail: detail.into(),
        });
        self.persist(&doc)
    }

    /// Attach a monitor rationale to a trade.
    pub fn rationale(
        &self,
        trade_id: &str,
        detail: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), LedgerError> {
        let mut doc = self.inner.lock();
        if !doc.trades.contains_key(trade_id) {
            return Err(LedgerError::UnknownTrade(trade_id.into()));
        }
        doc.journal.push(JournalEntry {
            trade_id: trade_id.into(),
            timestamp_ms: now_ms,
            kind: JournalKind::Rationale,
            detail: detail.into(),
        });
        self.persist(&doc)
    }

    /// One trade by id.
    pub fn get(&self, trade_id: &str) -> Option<Trade> {
        self.inner.lock().trades.get(trade_id).cloned()
    }

    /// All trades for a session date, ordered by trade id.
    pub fn by_date(&self, session_date: &str) -> Vec<Trade> {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.session_date == session_date)
            .cloned()
            .collect()
    }

    /// All trades touching a symbol.
    pub fn by_symbol(&self, symbol: &Symbol) -> Vec<Trade> {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.symbol() == symbol)
            .cloned()
            .collect()
    }

    /// All trades currently in a status.
    pub fn by_status(&self, status: TradeStatus) -> Vec<Trade> {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Live trades (working, open or closing) for a session date, in
    /// deterministic trade-id order.
    pub fn live_trades(&self, session_date: &str) -> Vec<Trade> {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.session_date == session_date && t.status.is_live())
            .cloned()
            .collect()
    }

    /// Journal entries for one trade, in append order.
    pub fn journal_for(&self, trade_id: &str) -> Vec<JournalEntry> {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|e| e.trade_id == trade_id)
            .cloned()
            .collect()
    }

    /// Realized P&L across a session date.
    pub fn realized_pnl(&self, session_date: &str) -> Decimal {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.session_date == session_date)
            .filter_map(|t| t.realized_pnl)
            .sum()
    }

    /// Unrealized P&L across open positions of a session date, priced by
    /// the supplied function.
    pub fn unrealized_pnl<F>(&self, session_date: &str, price_fn: F) -> Decimal
    where
        F: Fn(&Symbol) -> Option<Decimal>,
    {
        self.inner
            .lock()
            .trades
            .values()
            .filter(|t| t.session_date == session_date && t.status.is_live())
            .filter_map(|t| price_fn(t.symbol()).map(|p| t.unrealized_pnl(p)))
            .sum()
    }

    fn persist(&self, doc: &LedgerDoc) -> Result<(), LedgerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(doc)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{ApprovedOrder, Direction, EntryType, ProductType};
    use rust_decimal_macros::dec;

    fn trade(id: &str) -> Trade {
        let order = ApprovedOrder::new(
            "c1",
            Symbol::new("NSE:RELIANCE-EQ"),
            Direction::Long,
            500,
            EntryType::Limit,
            dec!(100.1),
            dec!(99.0),
            dec!(101.2),
            ProductType::Intraday,
            "t",
            1,
            dec!(1000),
        )
        .unwrap();
        Trade::from_approved(id, "2025-01-06", order, 0)
    }

    fn open_trade(ledger: &TradeLedger, id: &str) {
        ledger.insert(trade(id)).unwrap();
        ledger.transition(id, TradeStatus::Working, "entry placed", 1).unwrap();
        ledger
            .update(id, |t| {
                t.entry_fill_price = Some(dec!(100.1));
                t.filled_qty = 500;
                t.remaining_qty = 500;
                t.entry_time_ms = Some(2);
            })
            .unwrap();
        ledger.transition(id, TradeStatus::Open, "entry filled", 2).unwrap();
    }

    #[test]
    fn test_transitions_are_journaled() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");

        let journal = ledger.journal_for("t1");
        assert_eq!(journal.len(), 2);
        assert!(matches!(
            journal[0].kind,
            JournalKind::Transition { from: TradeStatus::Pending, to: TradeStatus::Working }
        ));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let ledger = TradeLedger::in_memory();
        ledger.insert(trade("t1")).unwrap();
        let err = ledger
            .transition("t1", TradeStatus::Closed, "skip ahead", 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transition(_)));
        // The failed attempt is not journaled.
        assert!(ledger.journal_for("t1").is_empty());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let ledger = TradeLedger::in_memory();
        ledger.insert(trade("t1")).unwrap();
        assert!(matches!(
            ledger.insert(trade("t1")),
            Err(LedgerError::DuplicateTrade(_))
        ));
    }

    #[test]
    fn test_exit_realizes_pnl() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");

        ledger.transition("t1", TradeStatus::Closing, "tp hit", 3).unwrap();
        ledger
            .record_exit("t1", dec!(101.2), ExitReason::TakeProfit, 4)
            .unwrap();
        ledger.transition("t1", TradeStatus::Closed, "exit filled", 4).unwrap();

        let trade = ledger.get("t1").unwrap();
        assert_eq!(trade.realized_pnl, Some(dec!(550.0)));
        assert_eq!(trade.remaining_qty, 0);
        assert_eq!(ledger.realized_pnl("2025-01-06"), dec!(550.0));
    }

    #[test]
    fn test_partial_exit_books_part() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");

        ledger.record_partial_exit("t1", 200, dec!(101.1), 3).unwrap();

        let trade = ledger.get("t1").unwrap();
        assert_eq!(trade.remaining_qty, 300);
        assert_eq!(trade.realized_pnl, Some(dec!(200.0)));
        assert_eq!(trade.status, TradeStatus::Open);
    }

    #[test]
    fn test_move_stop_journals_levels() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");

        ledger.move_stop("t1", dec!(100.1), "breakeven trail", 3).unwrap();

        assert_eq!(ledger.get("t1").unwrap().current_stop, dec!(100.1));
        let journal = ledger.journal_for("t1");
        assert!(matches!(
            journal.last().unwrap().kind,
            JournalKind::StopMoved { .. }
        ));
    }

    #[test]
    fn test_queries() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");
        ledger.insert(trade("t2")).unwrap();

        assert_eq!(ledger.by_date("2025-01-06").len(), 2);
        assert_eq!(ledger.by_status(TradeStatus::Open).len(), 1);
        assert_eq!(ledger.live_trades("2025-01-06").len(), 1);
        assert_eq!(ledger.by_symbol(&Symbol::new("NSE:RELIANCE-EQ")).len(), 2);
        // Deterministic trade-id ordering.
        let dates = ledger.by_date("2025-01-06");
        assert!(dates[0].trade_id < dates[1].trade_id);
    }

    #[test]
    fn test_unrealized_rollup() {
        let ledger = TradeLedger::in_memory();
        open_trade(&ledger, "t1");

        let unrealized = ledger.unrealized_pnl("2025-01-06", |_| Some(dec!(101.1)));
        assert_eq!(unrealized, dec!(500.0));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.json");
        {
            let ledger = TradeLedger::open(&path).unwrap();
            open_trade(&ledger, "t1");
        }
        let reloaded = TradeLedger::open(&path).unwrap();
        let trade = reloaded.get("t1").unwrap();
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(reloaded.journal_for("t1").len(), 2);
    }
}
