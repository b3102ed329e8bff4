//! Read-only access to auxiliary market data.
//!
//! Four capability groups (institutional flows, news, fundamentals, event
//! calendar) behind one shape regardless of source. Records come back
//! already shaped for direct inclusion in analyst inputs; adapter failures
//! are non-fatal and degrade to empty results with a warning.

use async_trait::async_trait;
use chrono::NaiveDate;
use model::Symbol;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// One day of institutional flow numbers (crores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub date: NaiveDate,
    /// Foreign institutional net buy (negative = net sell).
    pub fii_net: Decimal,
    /// Domestic institutional net buy.
    pub dii_net: Decimal,
}

/// One shaped news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub summary: String,
    /// Symbols the story references.
    pub symbols: Vec<Symbol>,
    /// Source-scored sentiment in [-1, 1].
    pub sentiment_score: Decimal,
    pub published_at_ms: i64,
}

/// Fundamental snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub symbol: Symbol,
    pub pe_ratio: Option<Decimal>,
    pub eps_growth_pct: Option<Decimal>,
    pub debt_to_equity: Option<Decimal>,
    /// Coarse quality grade A..D assigned by the source.
    pub quality_grade: Option<char>,
}

/// One scheduled corporate or macro event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub symbol: Option<Symbol>,
    pub kind: String,
    pub description: String,
}

/// The auxiliary-data port.
///
/// Empty results are valid; implementations must not surface transport
/// errors to workflows.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Institutional flows for the most recent `days` sessions.
    async fn institutional_flows(&self, days: u32) -> Vec<FlowSnapshot>;

    /// News items published since `since_ms`.
    async fn news_since(&self, since_ms: i64) -> Vec<NewsItem>;

    /// Fundamentals for the requested symbols (missing symbols omitted).
    async fn fundamentals(&self, symbols: &[Symbol]) -> Vec<FundamentalSnapshot>;

    /// Calendar events inside the date window.
    async fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<CalendarEvent>;
}

/// Shared market-data handle.
pub type SharedMarketData = Arc<dyn MarketData>;

/// In-process source backed by seeded records.
///
/// Used by tests and offline runs; doubles as the reference
/// implementation of the port's degrade-to-empty behaviour.
#[derive(Default)]
pub struct StaticMarketData {
    flows: RwLock<Vec<FlowSnapshot>>,
    news: RwLock<Vec<NewsItem>>,
    fundamentals: RwLock<Vec<FundamentalSnapshot>>,
    events: RwLock<Vec<CalendarEvent>>,
    /// When set, every call degrades to empty (simulating a dead source).
    unavailable: RwLock<bool>,
}

impl StaticMarketData {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed institutional flows.
    pub fn set_flows(&self, flows: Vec<FlowSnapshot>) {
        *self.flows.write() = flows;
    }

    /// Seed news items.
    pub fn set_news(&self, news: Vec<NewsItem>) {
        *self.news.write() = news;
    }

    /// Seed fundamentals.
    pub fn set_fundamentals(&self, fundamentals: Vec<FundamentalSnapshot>) {
        *self.fundamentals.write() = fundamentals;
    }

    /// Seed calendar events.
    pub fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.write() = events;
    }

    /// Simulate the upstream being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    fn degraded(&self, group: &str) -> bool {
        if *self.unavailable.read() {
            warn!(group, "market data source unavailable, returning empty");
            return true;
        }
        false
    }
}

#[async_trait]
impl MarketData for StaticMarketData {
    async fn institutional_flows(&self, days: u32) -> Vec<FlowSnapshot> {
        if self.degraded("flows") {
            return Vec::new();
        }
        let flows = self.flows.read();
        let take = days as usize;
        flows.iter().rev().take(take).rev().cloned().collect()
    }

    async fn news_since(&self, since_ms: i64) -> Vec<NewsItem> {
        if self.degraded("news") {
            return Vec::new();
        }
        self.news
            .read()
            .iter()
            .filter(|n| n.published_at_ms >= since_ms)
            .cloned()
            .collect()
    }

    async fn fundamentals(&self, symbols: &[Symbol]) -> Vec<FundamentalSnapshot> {
        if self.degraded("fundamentals") {
            return Vec::new();
        }
        self.fundamentals
            .read()
            .iter()
            .filter(|f| symbols.contains(&f.symbol))
            .cloned()
            .collect()
    }

    async fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<CalendarEvent> {
        if self.degraded("events") {
            return Vec::new();
        }
        self.events
            .read()
            .iter()
            .filter(|e| e.date >= from && e.date <= to)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn news_item(published_at_ms: i64) -> NewsItem {
        NewsItem {
            headline: "headline".into(),
            summary: "summary".into(),
            symbols: vec![Symbol::new("NSE:TCS-EQ")],
            sentiment_score: dec!(-0.4),
            published_at_ms,
        }
    }

    #[tokio::test]
    async fn test_news_since_filters_by_time() {
        let source = StaticMarketData::new();
        source.set_news(vec![news_item(1_000), news_item(5_000)]);

        assert_eq!(source.news_since(2_000).await.len(), 1);
        assert_eq!(source.news_since(0).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_source_degrades_to_empty() {
        let source = StaticMarketData::new();
        source.set_news(vec![news_item(1_000)]);
        source.set_unavailable(true);

        assert!(source.news_since(0).await.is_empty());
        assert!(source.institutional_flows(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_fundamentals_filtered_by_symbols() {
        let source = StaticMarketData::new();
        source.set_fundamentals(vec![FundamentalSnapshot {
            symbol: Symbol::new("NSE:TCS-EQ"),
            pe_ratio: Some(dec!(28)),
            eps_growth_pct: Some(dec!(12)),
            debt_to_equity: Some(dec!(0.1)),
            quality_grade: Some('A'),
        }]);

        let hit = source.fundamentals(&[Symbol::new("NSE:TCS-EQ")]).await;
        assert_eq!(hit.len(), 1);
        let miss = source.fundamentals(&[Symbol::new("NSE:INFY-EQ")]).await;
        assert!(miss.is_empty());
    }
}
