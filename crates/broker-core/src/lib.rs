//! Typed facade over an external brokerage.
//!
//! The core depends only on the [`Broker`] trait and the wire-neutral types
//! in this crate; adapters (simulated, REST) translate their own symbology
//! and status codes at this boundary. No broker-specific type leaks out.

mod error;
mod intent;
mod port;
mod rate_limit;
mod types;
mod update;

pub use error::BrokerError;
pub use intent::{BrokerOrderType, OrderAck, OrderChanges, OrderIntent, OrderSide};
pub use port::{Broker, SharedBroker};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use types::{
    Candle, Depth, DepthLevel, Funds, HistoryRequest, Holding, MarginRequirement, OptionStrike,
    PositionSnapshot, Profile, Quote, TradebookEntry,
};
pub use update::{BrokerOrderStatus, MarketTick, OrderUpdate};
