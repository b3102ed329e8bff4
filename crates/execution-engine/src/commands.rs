//! Commands the position monitor emits against open trades.

use model::ExitReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A modification to an existing trade.
///
/// The monitor can only move stops, book part of a position or close it;
/// there is no command that opens a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeCommand {
    /// Move the protective stop to a new level.
    ModifyStop {
        trade_id: String,
        new_stop: Decimal,
        rationale: String,
    },
    /// Book part of the position at market, leaving the rest to run.
    PartialExit {
        trade_id: String,
        quantity: u32,
        rationale: String,
    },
    /// Close the whole position at market.
    Close {
        trade_id: String,
        reason: ExitReason,
        rationale: String,
    },
}

impl TradeCommand {
    /// The trade this command targets.
    pub fn trade_id(&self) -> &str {
        match self {
            Self::ModifyStop { trade_id, .. }
            | Self::PartialExit { trade_id, .. }
            | Self::Close { trade_id, .. } => trade_id,
        }
    }
}
