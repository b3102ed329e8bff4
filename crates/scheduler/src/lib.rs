//! Wall-clock scheduler.
//!
//! Fires the five workflows on a market-hours trigger table in the venue's
//! local timezone, trading days only. Missed trigger minutes are skipped,
//! never replayed; overlapping triggers are dropped with an audit event;
//! every dispatch is gated on a valid broker token.

mod calendar;
mod scheduler;
mod triggers;

pub use calendar::{TradingCalendar, WeekdayCalendar};
pub use scheduler::{
    DispatchResult, Scheduler, SchedulerConfig, SchedulerEvent, WorkflowDispatcher,
};
pub use triggers::{default_triggers, TriggerKind, TriggerSpec};

/// The five scheduled workflows.
pub mod workflows {
    pub const INTRADAY_ANALYSIS: &str = "intraday-analysis";
    pub const ORDER_EXECUTION: &str = "order-execution";
    pub const POSITION_MONITORING: &str = "position-monitoring";
    pub const NEWS_DIGEST: &str = "news-digest";
    pub const POST_TRADE_ANALYSIS: &str = "post-trade-analysis";
}
