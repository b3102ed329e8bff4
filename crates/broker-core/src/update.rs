//! Push updates delivered over broker subscriptions.

use crate::OrderSide;
use model::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order status as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderStatus {
    /// Accepted and working.
    Accepted,
    /// Partially filled, still working.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled by the client or by the venue.
    Cancelled,
    /// Rejected by the broker or exchange.
    Rejected,
    /// Stop trigger fired, exit leg now working.
    Triggered,
}

impl BrokerOrderStatus {
    /// Whether the order is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

/// One order-state change.
///
/// Delivery is at-least-once: consumers must be idempotent on
/// `(broker_order_id, status, filled_qty)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub broker_order_id: String,
    /// The idempotency tag the order was placed with.
    pub client_tag: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub status: BrokerOrderStatus,
    /// Cumulative filled quantity.
    pub filled_qty: u32,
    /// Average fill price across fills so far.
    pub avg_fill_price: Option<Decimal>,
    /// Broker message, populated on rejections.
    pub message: Option<String>,
    pub timestamp_ms: i64,
}

impl OrderUpdate {
    /// Whether this update reports any filled quantity.
    pub fn has_fill(&self) -> bool {
        self.filled_qty > 0
    }

    /// Dedup key for at-least-once delivery.
    pub fn dedup_key(&self) -> (String, BrokerOrderStatus, u32) {
        (self.broker_order_id.clone(), self.status, self.filled_qty)
    }
}

/// One market data tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub volume: u64,
    pub timestamp_ms: i64,
}
