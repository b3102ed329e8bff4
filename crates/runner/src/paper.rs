//! Paper-trading seeds and the offline auth flow.

use crate::config::AppConfig;
use async_trait::async_trait;
use auth::{AuthError, AuthFlow, Token};
use broker_core::{Candle, OptionStrike};
use broker_sim::SimBroker;
use chrono::NaiveDate;
use market_data::{CalendarEvent, FlowSnapshot, FundamentalSnapshot, NewsItem, StaticMarketData};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

/// Seed the simulated broker with prices, candle history and option
/// chains so the full analysis pipeline has data to work with.
pub fn seed_broker(sim: &SimBroker, config: &AppConfig, now_ms: i64) {
    for (i, symbol) in config.universe.iter().enumerate() {
        let base = Decimal::from(500 + 100 * i as u32);
        sim.set_price(symbol, base);
        sim.set_history(symbol.clone(), trending_candles(base, now_ms));
        sim.set_option_chain(symbol.clone(), put_skewed_chain(base));
    }
    // Calm volatility and a steady index by default; tests override.
    sim.set_price(&config.vix_symbol, Decimal::from(11));
    sim.set_price(&config.index_symbol, Decimal::from(21_000));
    info!(symbols = config.universe.len(), "paper broker seeded");
}

/// Gently rising 5-minute bars ending at the base price.
fn trending_candles(base: Decimal, now_ms: i64) -> Vec<Candle> {
    let base = base.to_f64().unwrap_or(500.0);
    let bars = 80i64;
    let step = base * 0.0005;
    (0..bars)
        .map(|j| {
            let close = base - (bars - 1 - j) as f64 * step;
            Candle {
                timestamp_ms: now_ms - (bars - j) * 5 * 60_000,
                open: close - step / 2.0,
                high: close + base * 0.001,
                low: close - base * 0.001,
                close,
                volume: 10_000.0,
                open_interest: None,
            }
        })
        .collect()
}

/// A mildly put-skewed chain around the spot (bullish positioning).
fn put_skewed_chain(base: Decimal) -> Vec<OptionStrike> {
    let step = Decimal::from(10);
    (-2..=2)
        .map(|k| OptionStrike {
            strike: base + step * Decimal::from(k),
            call_oi: 1_000,
            put_oi: 1_600,
            call_iv: Decimal::new(18, 0),
            put_iv: Decimal::new(19, 0),
            call_delta: Decimal::new(5, 1),
            put_delta: Decimal::new(-5, 1),
        })
        .collect()
}

/// Seed the static market-data source with flows, news, fundamentals and
/// a calendar entry.
pub fn seed_market_data(market: &StaticMarketData, config: &AppConfig) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let today = chrono::Utc::now().date_naive();

    market.set_flows(
        (0..5)
            .map(|i| FlowSnapshot {
                date: today - chrono::Duration::days(i),
                fii_net: Decimal::from(500),
                dii_net: Decimal::from(200),
            })
            .collect(),
    );

    market.set_news(
        config
            .universe
            .iter()
            .take(3)
            .map(|symbol| NewsItem {
                headline: format!("{symbol} wins large order book"),
                summary: "order inflow ahead of estimates".into(),
                symbols: vec![symbol.clone()],
                sentiment_score: Decimal::new(5, 1),
                published_at_ms: now_ms - 3_600_000,
            })
            .collect(),
    );

    market.set_fundamentals(
        config
            .universe
            .iter()
            .enumerate()
            .map(|(i, symbol)| FundamentalSnapshot {
                symbol: symbol.clone(),
                pe_ratio: Some(Decimal::from(25)),
                eps_growth_pct: Some(Decimal::from(12)),
                debt_to_equity: Some(Decimal::new(4, 1)),
                quality_grade: Some(if i < 5 { 'A' } else { 'B' }),
            })
            .collect(),
    );

    market.set_events(vec![CalendarEvent {
        date: today,
        symbol: None,
        kind: "macro".into(),
        description: "weekly F&O expiry".into(),
    }]);
}

/// Auth flow for paper mode: every probe passes, refresh mints a fresh
/// long-lived token.
pub struct PaperAuthFlow;

#[async_trait]
impl AuthFlow for PaperAuthFlow {
    async fn probe(&self, _access_token: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Token::new(
            "paper-access",
            Some(refresh_token.to_string()),
            now,
            now + 24 * 3600 * 1_000,
            "PAPER",
            None,
        ))
    }
}

/// A ready-to-use paper token.
pub fn paper_token(now_ms: i64) -> Token {
    Token::new(
        "paper-access",
        Some("paper-refresh".into()),
        now_ms,
        now_ms + 24 * 3600 * 1_000,
        "PAPER",
        None,
    )
}

/// Holiday list placeholder: deployments load the venue's published list.
pub fn exchange_holidays() -> Vec<NaiveDate> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trending_candles_end_at_base() {
        let candles = trending_candles(Decimal::from(500), 1_000_000_000);
        assert_eq!(candles.len(), 80);
        let last = candles.last().unwrap();
        assert!((last.close - 500.0).abs() < 1.0);
        // Monotonic uptrend.
        assert!(candles.windows(2).all(|w| w[0].close <= w[1].close));
    }

    #[test]
    fn test_chain_is_put_skewed() {
        let chain = put_skewed_chain(Decimal::from(500));
        let put: u64 = chain.iter().map(|s| s.put_oi).sum();
        let call: u64 = chain.iter().map(|s| s.call_oi).sum();
        assert!(put > call);
    }
}
