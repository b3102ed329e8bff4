//! REST adapter for a Fyers-style brokerage API.
//!
//! Implements the broker port over authenticated HTTP. All symbology and
//! status codes are translated here; nothing broker-specific leaks past
//! the port. Order and market subscriptions are poll-backed: a background
//! poller diffs the order book and broadcasts changes, which satisfies the
//! port's at-least-once contract.

mod client;
mod http;
mod responses;

pub use client::{RestAuthFlow, RestBroker, RestBrokerConfig, TokenSource};
pub use http::HttpClient;
