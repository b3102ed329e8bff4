//! Deterministic rule-based analysts.
//!
//! These implement the analyst port with indicator-driven rules so the
//! pipeline runs unattended; a remote reasoning body can replace any of
//! them without touching the workflows, since only the artifact contract
//! matters.

use async_trait::async_trait;
use broker_core::{Broker, HistoryRequest};
use indicators as ind;
use model::{
    Artifact, NewsDigest, Regime, RegimeState, ScoreRange, Sentiment, StockSignal, Symbol,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};
use workflow_core::{Analyst, StageContext, StageError};

/// VIX thresholds and multipliers for regime classification.
#[derive(Debug, Clone)]
pub struct RegimeThresholds {
    pub calm: Decimal,
    pub elevated: Decimal,
    pub halt: Decimal,
}

/// Classify a VIX reading into a regime.
pub fn classify_regime(
    vix: Decimal,
    thresholds: &RegimeThresholds,
    produced_at_ms: i64,
) -> Result<Regime, model::ValidationError> {
    let (state, multiplier) = if vix >= thresholds.halt {
        (RegimeState::Halt, Decimal::ZERO)
    } else if vix >= thresholds.elevated {
        (RegimeState::Elevated, Decimal::new(5, 1))
    } else if vix <= thresholds.calm {
        (RegimeState::Calm, Decimal::new(12, 1))
    } else {
        (RegimeState::Normal, Decimal::ONE)
    };
    Regime::new(state, vix, multiplier, produced_at_ms)
}

/// Reads the volatility index and classifies the market regime.
pub struct RegimeAnalyst {
    pub vix_symbol: Symbol,
    pub thresholds: RegimeThresholds,
}

#[async_trait]
impl Analyst for RegimeAnalyst {
    fn id(&self) -> &str {
        "regime"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let vix = ctx.ports.broker.last_price(&self.vix_symbol).await?;
        let regime = classify_regime(vix, &self.thresholds, ctx.now_ms)?;
        debug!(vix = %vix, state = regime.state.as_str(), "regime classified");
        Ok(Artifact::Regime(regime))
    }
}

/// Shared universe handle.
pub type Universe = Arc<Vec<Symbol>>;

async fn closes_for(
    ctx: &StageContext<'_>,
    symbol: &Symbol,
    bars: i64,
) -> Option<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    let request = HistoryRequest {
        symbol: symbol.clone(),
        resolution: "5".into(),
        from_ms: ctx.now_ms - bars * 5 * 60_000,
        to_ms: ctx.now_ms,
        with_oi: false,
    };
    match ctx.ports.broker.get_history(&request).await {
        Ok(candles) if !candles.is_empty() => Some((
            candles.iter().map(|c| c.high).collect(),
            candles.iter().map(|c| c.low).collect(),
            candles.iter().map(|c| c.close).collect(),
            candles.iter().map(|c| c.volume).collect(),
        )),
        Ok(_) => None,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "history unavailable");
            None
        }
    }
}

/// Technical score in ±5 from trend, momentum and VWAP posture.
pub fn technical_score(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Option<i32> {
    if close.len() < 40 {
        return None;
    }
    let mut score = 0i32;

    let fast = ind::sma(close, 10);
    let slow = ind::sma(close, 30);
    match (fast.last(), slow.last()) {
        (Some(f), Some(s)) if f > s => score += 2,
        (Some(f), Some(s)) if f < s => score -= 2,
        _ => {}
    }

    if let Some(macd) = ind::macd(close, 12, 26, 9) {
        match macd.histogram.last() {
            Some(h) if *h > 0.0 => score += 1,
            Some(h) if *h < 0.0 => score -= 1,
            _ => {}
        }
    }

    if let Some(rsi) = ind::rsi(close, 14).last() {
        if *rsi > 70.0 {
            score -= 1;
        } else if *rsi < 30.0 {
            score += 1;
        }
    }

    if let Some(vwap) = ind::vwap(high, low, close, volume).last() {
        if close.last()? > vwap {
            score += 1;
        } else {
            score -= 1;
        }
    }

    Some(score.clamp(-5, 5))
}

/// Price-action analyst over the universe.
pub struct TechnicalAnalyst {
    pub universe: Universe,
}

#[async_trait]
impl Analyst for TechnicalAnalyst {
    fn id(&self) -> &str {
        "technical"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let range = ScoreRange::symmetric(5);
        let mut signals = Vec::new();
        for symbol in self.universe.iter() {
            let Some((high, low, close, volume)) = closes_for(ctx, symbol, 80).await else {
                continue;
            };
            let Some(score) = technical_score(&high, &low, &close, &volume) else {
                continue;
            };
            if score == 0 {
                continue;
            }
            let confidence = confidence_from_score(score, 5);
            signals.push(StockSignal::new(
                symbol.clone(),
                self.id(),
                score,
                range,
                confidence,
                format!("trend/momentum composite {score} over 5m bars"),
                ctx.now_ms,
            )?);
        }
        Ok(Artifact::Signals(signals))
    }
}

/// Fundamentals analyst: maps source quality grades into ±3.
pub struct FundamentalAnalyst {
    pub universe: Universe,
}

/// Grade letter into a ±3 score.
pub fn grade_score(grade: char) -> i32 {
    match grade {
        'A' => 3,
        'B' => 1,
        'C' => -1,
        'D' => -3,
        _ => 0,
    }
}

#[async_trait]
impl Analyst for FundamentalAnalyst {
    fn id(&self) -> &str {
        "fundamental"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let range = ScoreRange::symmetric(3);
        let snapshots = ctx.ports.market.fundamentals(&self.universe).await;
        let mut signals = Vec::new();
        for snapshot in snapshots {
            let Some(grade) = snapshot.quality_grade else {
                continue;
            };
            let score = grade_score(grade);
            if score == 0 {
                continue;
            }
            signals.push(StockSignal::new(
                snapshot.symbol.clone(),
                self.id(),
                score,
                range,
                confidence_from_score(score, 3),
                format!("quality grade {grade}"),
                ctx.now_ms,
            )?);
        }
        Ok(Artifact::Signals(signals))
    }
}

/// Market-intelligence analyst: institutional flows plus news tone, ±3.
pub struct MarketIntelAnalyst {
    pub universe: Universe,
}

/// Flow- and news-driven score for one symbol.
pub fn intel_score(fii_net: Decimal, symbol_sentiment: Decimal) -> i32 {
    let mut score = 0i32;
    if fii_net > Decimal::ZERO {
        score += 1;
    } else if fii_net < Decimal::ZERO {
        score -= 1;
    }
    if symbol_sentiment > Decimal::new(2, 1) {
        score += 2;
    } else if symbol_sentiment < Decimal::new(-2, 1) {
        score -= 2;
    }
    score.clamp(-3, 3)
}

#[async_trait]
impl Analyst for MarketIntelAnalyst {
    fn id(&self) -> &str {
        "market-intel"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let range = ScoreRange::symmetric(3);
        let flows = ctx.ports.market.institutional_flows(5).await;
        let fii_net: Decimal = flows.iter().map(|f| f.fii_net).sum();
        let day_start = ctx.now_ms - 24 * 3600 * 1_000;
        let news = ctx.ports.market.news_since(day_start).await;

        let mut signals = Vec::new();
        for symbol in self.universe.iter() {
            let tone: Decimal = news
                .iter()
                .filter(|n| n.symbols.contains(symbol))
                .map(|n| n.sentiment_score)
                .sum();
            let score = intel_score(fii_net, tone);
            if score == 0 {
                continue;
            }
            signals.push(StockSignal::new(
                symbol.clone(),
                self.id(),
                score,
                range,
                confidence_from_score(score, 3),
                format!("fii_net={fii_net}, news_tone={tone}"),
                ctx.now_ms,
            )?);
        }
        Ok(Artifact::Signals(signals))
    }
}

/// Derivatives analyst: options positioning via PCR and max pain, ±3.
pub struct DerivativesAnalyst {
    pub universe: Universe,
}

/// Options positioning score from put-call ratio and max pain versus spot.
pub fn derivatives_score(pcr: Option<f64>, max_pain: Option<f64>, spot: f64) -> i32 {
    let mut score = 0i32;
    if let Some(pcr) = pcr {
        if pcr > 1.2 {
            score += 2;
        } else if pcr < 0.8 {
            score -= 2;
        }
    }
    if let Some(pain) = max_pain {
        if spot < pain {
            score += 1;
        } else if spot > pain {
            score -= 1;
        }
    }
    score.clamp(-3, 3)
}

#[async_trait]
impl Analyst for DerivativesAnalyst {
    fn id(&self) -> &str {
        "derivatives"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        use rust_decimal::prelude::ToPrimitive;

        let range = ScoreRange::symmetric(3);
        let mut signals = Vec::new();
        for symbol in self.universe.iter() {
            let chain = match ctx.ports.broker.get_option_chain(symbol, 10).await {
                Ok(chain) if !chain.is_empty() => chain,
                Ok(_) => continue,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "option chain unavailable");
                    continue;
                }
            };
            let spot = match ctx.ports.broker.last_price(symbol).await {
                Ok(p) => p.to_f64().unwrap_or(0.0),
                Err(_) => continue,
            };

            let total_put: f64 = chain.iter().map(|s| s.put_oi as f64).sum();
            let total_call: f64 = chain.iter().map(|s| s.call_oi as f64).sum();
            let pcr = ind::put_call_ratio(total_put, total_call);
            let strikes: Vec<ind::StrikeOpenInterest> = chain
                .iter()
                .map(|s| ind::StrikeOpenInterest {
                    strike: s.strike.to_f64().unwrap_or(0.0),
                    call_oi: s.call_oi as f64,
                    put_oi: s.put_oi as f64,
                })
                .collect();
            let pain = ind::max_pain(&strikes);

            let score = derivatives_score(pcr, pain, spot);
            if score == 0 {
                continue;
            }
            signals.push(StockSignal::new(
                symbol.clone(),
                self.id(),
                score,
                range,
                confidence_from_score(score, 3),
                format!("pcr={pcr:?}, max_pain={pain:?}"),
                ctx.now_ms,
            )?);
        }
        Ok(Artifact::Signals(signals))
    }
}

/// News analyst: shapes the session's news flow into a digest.
pub struct NewsAnalyst;

/// Aggregate tone into a market sentiment bucket.
pub fn tone_to_sentiment(mean_tone: Decimal) -> Sentiment {
    if mean_tone > Decimal::new(2, 1) {
        Sentiment::RiskOn
    } else if mean_tone < Decimal::new(-2, 1) {
        Sentiment::RiskOff
    } else {
        Sentiment::Neutral
    }
}

#[async_trait]
impl Analyst for NewsAnalyst {
    fn id(&self) -> &str {
        "news"
    }

    async fn analyze(&self, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let day_start = ctx.now_ms - 24 * 3600 * 1_000;
        let items = ctx.ports.market.news_since(day_start).await;
        if items.is_empty() {
            return Ok(Artifact::NewsDigest(NewsDigest::empty(ctx.now_ms)));
        }

        let mean_tone = items
            .iter()
            .map(|n| n.sentiment_score)
            .sum::<Decimal>()
            / Decimal::from(items.len() as u32);
        let mut affected: Vec<Symbol> = Vec::new();
        for item in &items {
            for symbol in &item.symbols {
                if !affected.contains(symbol) {
                    affected.push(symbol.clone());
                }
            }
        }

        Ok(Artifact::NewsDigest(NewsDigest {
            produced_at_ms: ctx.now_ms,
            key_events: items.iter().map(|n| n.headline.clone()).collect(),
            sentiment: tone_to_sentiment(mean_tone),
            affected_symbols: affected,
        }))
    }
}

/// Confidence grows with conviction: 0.6 base, +0.05 per score point,
/// capped at 0.95.
fn confidence_from_score(score: i32, span: i32) -> Decimal {
    let magnitude = score.unsigned_abs().min(span.unsigned_abs());
    let base = Decimal::new(6, 1);
    let step = Decimal::new(5, 2);
    (base + step * Decimal::from(magnitude)).min(Decimal::new(95, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn thresholds() -> RegimeThresholds {
        RegimeThresholds {
            calm: dec!(13),
            elevated: dec!(20),
            halt: dec!(30),
        }
    }

    #[test]
    fn test_regime_classification() {
        let calm = classify_regime(dec!(11), &thresholds(), 0).unwrap();
        assert_eq!(calm.state, RegimeState::Calm);
        assert_eq!(calm.position_multiplier, dec!(1.2));

        let normal = classify_regime(dec!(16), &thresholds(), 0).unwrap();
        assert_eq!(normal.state, RegimeState::Normal);

        let elevated = classify_regime(dec!(22), &thresholds(), 0).unwrap();
        assert_eq!(elevated.state, RegimeState::Elevated);
        assert_eq!(elevated.position_multiplier, dec!(0.5));

        let halt = classify_regime(dec!(35), &thresholds(), 0).unwrap();
        assert!(halt.is_halted());
        assert_eq!(halt.position_multiplier, dec!(0));
    }

    #[test]
    fn test_technical_score_trending_up() {
        let n = 80;
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.5).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let volume = vec![1_000.0; n];

        let score = technical_score(&high, &low, &close, &volume).unwrap();
        assert!(score > 0, "uptrend scored {score}");
    }

    #[test]
    fn test_technical_score_insufficient_history() {
        let short = vec![100.0; 10];
        assert!(technical_score(&short, &short, &short, &short).is_none());
    }

    #[test]
    fn test_grade_scores() {
        assert_eq!(grade_score('A'), 3);
        assert_eq!(grade_score('D'), -3);
        assert_eq!(grade_score('X'), 0);
    }

    #[test]
    fn test_intel_score() {
        assert_eq!(intel_score(dec!(500), dec!(0.5)), 3);
        assert_eq!(intel_score(dec!(-500), dec!(-0.5)), -3);
        assert_eq!(intel_score(dec!(0), dec!(0)), 0);
    }

    #[test]
    fn test_derivatives_score() {
        // Put-heavy chain below max pain reads bullish.
        assert_eq!(derivatives_score(Some(1.5), Some(105.0), 100.0), 3);
        // Call-heavy chain above max pain reads bearish.
        assert_eq!(derivatives_score(Some(0.5), Some(95.0), 100.0), -3);
        assert_eq!(derivatives_score(None, None, 100.0), 0);
    }

    #[test]
    fn test_tone_to_sentiment() {
        assert_eq!(tone_to_sentiment(dec!(0.5)), Sentiment::RiskOn);
        assert_eq!(tone_to_sentiment(dec!(-0.5)), Sentiment::RiskOff);
        assert_eq!(tone_to_sentiment(dec!(0.1)), Sentiment::Neutral);
    }

    #[test]
    fn test_confidence_scaling() {
        assert_eq!(confidence_from_score(1, 5), dec!(0.65));
        assert_eq!(confidence_from_score(5, 5), dec!(0.85));
        assert_eq!(confidence_from_score(-3, 3), dec!(0.75));
    }
}
