//! Order execution engine.
//!
//! Turns approved orders into live broker orders and runs each trade's
//! lifecycle: place entry, wait for the fill, bracket with stop and target
//! children, reconcile against broker truth. Risk sizing from candidates
//! to approved orders lives here too, as does the command surface the
//! position monitor drives modifications through.

mod commands;
mod config;
mod engine;
mod report;
mod sizing;

pub use commands::TradeCommand;
pub use config::ExecutionConfig;
pub use engine::{AuthRecovery, ExecutionEngine, NoAuthRecovery};
pub use report::{ExecutionReport, OrderResult};
pub use sizing::{size_candidates, RiskLimits, SizingContext, SizingOutcome, SkipReason, SkippedCandidate};
