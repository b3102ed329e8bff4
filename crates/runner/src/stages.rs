//! Function stages used by the workflow definitions.

use crate::config::{lot_size_of, sector_of, AppConfig};
use async_trait::async_trait;
use broker_core::{Broker, Quote};
use chrono::FixedOffset;
use execution_engine::{size_candidates, ExecutionEngine, SizingContext};
use model::{
    state_keys, Artifact, Candidate, Direction, NewsDigest, SessionState, StockSignal, Symbol,
};
use position_monitor::PositionMonitor;
use rust_decimal::Decimal;
use scheduler::workflows;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use workflow_core::{FunctionStage, StageContext, StageError, StageFlow};

/// Stores the regime and short-circuits the run when the market is halted.
pub struct RegimeGate;

#[async_trait]
impl FunctionStage for RegimeGate {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let regime = ctx
            .previous
            .and_then(Artifact::as_regime)
            .ok_or_else(|| StageError::MissingStep("regime".into()))?
            .clone();

        let halted = regime.is_halted();
        state.set(state_keys::REGIME, Artifact::Regime(regime.clone()));

        if halted {
            // Downstream workflows read empty sets, not missing keys.
            state.set(state_keys::CANDIDATES, Artifact::Candidates(vec![]));
            state.set(state_keys::APPROVED_ORDERS, Artifact::ApprovedOrders(vec![]));
            info!(vix = %regime.vix, "market halted, analysis gated");
            return Ok(StageFlow::Halt(Artifact::Report(format!(
                "halted: vix {} beyond halt threshold",
                regime.vix
            ))));
        }
        Ok(StageFlow::Continue(Artifact::Regime(regime)))
    }
}

/// Aggregates the research group's signals into candidates.
pub struct AggregateCandidates {
    pub config: Arc<AppConfig>,
}

#[async_trait]
impl FunctionStage for AggregateCandidates {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let group = match ctx.previous {
            Some(Artifact::Group(map)) => map,
            _ => return Err(StageError::MissingStep("research group".into())),
        };

        let mut by_symbol: BTreeMap<Symbol, Vec<StockSignal>> = BTreeMap::new();
        for artifact in group.values() {
            if let Some(signals) = artifact.as_signals() {
                for signal in signals {
                    by_symbol
                        .entry(signal.symbol.clone())
                        .or_default()
                        .push(signal.clone());
                }
            }
        }

        let quotes = self.quotes_for(ctx, by_symbol.keys().cloned().collect()).await;
        let mut candidates = Vec::new();
        for (symbol, signals) in by_symbol {
            match self.build_candidate(ctx, &symbol, &signals, quotes.get(&symbol)) {
                Some(candidate) => candidates.push(candidate),
                None => continue,
            }
        }
        candidates.sort_by(|a, b| {
            b.composite_score
                .abs()
                .cmp(&a.composite_score.abs())
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        info!(candidates = candidates.len(), "aggregation complete");
        state.set(state_keys::CANDIDATES, Artifact::Candidates(candidates.clone()));
        Ok(StageFlow::Continue(Artifact::Candidates(candidates)))
    }
}

impl AggregateCandidates {
    async fn quotes_for(
        &self,
        ctx: &StageContext<'_>,
        symbols: Vec<Symbol>,
    ) -> HashMap<Symbol, Quote> {
        if symbols.is_empty() {
            return HashMap::new();
        }
        match ctx.ports.broker.get_quotes(&symbols).await {
            Ok(quotes) => quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect(),
            Err(e) => {
                warn!(error = %e, "quotes unavailable during aggregation");
                HashMap::new()
            }
        }
    }

    fn build_candidate(
        &self,
        ctx: &StageContext<'_>,
        symbol: &Symbol,
        signals: &[StockSignal],
        quote: Option<&Quote>,
    ) -> Option<Candidate> {
        let config = &self.config;
        let composite: Decimal = signals.iter().map(|s| Decimal::from(s.score)).sum();
        if composite.abs() < config.min_composite_score {
            return None;
        }
        let agreeing = signals
            .iter()
            .filter(|s| (s.score > 0) == (composite > Decimal::ZERO))
            .count();
        if agreeing < config.min_agreeing_analysts {
            return None;
        }

        let quote = quote?;
        let last = quote.last_price;
        if last <= Decimal::ZERO {
            return None;
        }

        let direction = if composite > Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };
        let band = last * Decimal::new(2, 3);
        let (entry_low, entry_high) = match direction {
            Direction::Long => (last, last + band),
            Direction::Short => (last - band, last),
        };
        let near_edge = match direction {
            Direction::Long => entry_low,
            Direction::Short => entry_high,
        };
        let stop_distance = near_edge * config.stop_pct;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (
                near_edge - stop_distance,
                entry_high + config.reward_risk * stop_distance,
            ),
            Direction::Short => (
                near_edge + stop_distance,
                entry_low - config.reward_risk * stop_distance,
            ),
        };

        let confidence = signals
            .iter()
            .map(|s| s.confidence)
            .sum::<Decimal>()
            / Decimal::from(signals.len() as u32);

        match Candidate::new(
            format!("{}:{}", ctx.session_id, symbol),
            symbol.clone(),
            direction,
            composite,
            confidence,
            entry_low,
            entry_high,
            stop_loss,
            take_profit,
            config.risk.target_move,
            signals.to_vec(),
        ) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "candidate rejected at construction");
                None
            }
        }
    }
}

/// Sizes candidates into approved orders under the regime and risk caps.
pub struct RiskSizing {
    pub config: Arc<AppConfig>,
}

#[async_trait]
impl FunctionStage for RiskSizing {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let regime = state
            .get(state_keys::REGIME)
            .and_then(Artifact::as_regime)
            .ok_or_else(|| StageError::MissingStep("regime".into()))?
            .clone();
        let candidates: Vec<Candidate> = state
            .get(state_keys::CANDIDATES)
            .and_then(Artifact::as_candidates)
            .map(<[Candidate]>::to_vec)
            .unwrap_or_default();

        let symbols: Vec<Symbol> = candidates.iter().map(|c| c.symbol.clone()).collect();
        let quotes: HashMap<Symbol, Quote> = if symbols.is_empty() {
            HashMap::new()
        } else {
            match ctx.ports.broker.get_quotes(&symbols).await {
                Ok(quotes) => quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect(),
                Err(e) => {
                    warn!(error = %e, "quotes unavailable during sizing");
                    HashMap::new()
                }
            }
        };

        let sizing_ctx = SizingContext {
            lot_size: &lot_size_of,
            sector: &sector_of,
            quotes: &quotes,
            liquid_spread_pct: Decimal::new(15, 2),
            momentum_score: Decimal::from(8),
            illiquid_limit_offset: Decimal::new(1, 3),
        };
        let outcome = size_candidates(&candidates, &regime, &self.config.risk, &sizing_ctx);

        state.set(
            state_keys::APPROVED_ORDERS,
            Artifact::ApprovedOrders(outcome.approved.clone()),
        );
        state.set(
            "sizing_skips",
            Artifact::Json(json!(outcome
                .skipped
                .iter()
                .map(|s| json!({
                    "candidate_id": s.candidate_id,
                    "symbol": s.symbol.as_str(),
                    "reason": s.reason.as_str(),
                }))
                .collect::<Vec<_>>())),
        );
        Ok(StageFlow::Continue(Artifact::ApprovedOrders(outcome.approved)))
    }
}

/// Loads the analysis workflow's approved orders into the execution run.
pub struct LoadApprovedOrders;

#[async_trait]
impl FunctionStage for LoadApprovedOrders {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let analysis = ctx.cross_state(workflows::INTRADAY_ANALYSIS)?;
        let approved = analysis
            .get(state_keys::APPROVED_ORDERS)
            .and_then(Artifact::as_approved_orders)
            .map(<[model::ApprovedOrder]>::to_vec)
            .unwrap_or_default();
        let regime = analysis.get(state_keys::REGIME).cloned();

        info!(orders = approved.len(), "approved orders loaded for execution");
        if let Some(regime) = regime {
            state.set(state_keys::REGIME, regime);
        }
        state.set(
            state_keys::APPROVED_ORDERS,
            Artifact::ApprovedOrders(approved.clone()),
        );
        Ok(StageFlow::Continue(Artifact::ApprovedOrders(approved)))
    }
}

/// Drives the execution engine over the loaded approved orders.
pub struct ExecuteBatch {
    pub engine: Arc<ExecutionEngine>,
}

#[async_trait]
impl FunctionStage for ExecuteBatch {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let approved = state
            .get(state_keys::APPROVED_ORDERS)
            .and_then(Artifact::as_approved_orders)
            .map(<[model::ApprovedOrder]>::to_vec)
            .unwrap_or_default();

        let report = self
            .engine
            .execute_batch(ctx.session_id, &approved)
            .await
            .map_err(|e| StageError::Other(e.to_string()))?;

        let summary = serde_json::to_value(&report)
            .map_err(|e| StageError::Other(e.to_string()))?;
        state.set(state_keys::EXECUTION, Artifact::Json(summary.clone()));
        Ok(StageFlow::Continue(Artifact::Json(summary)))
    }
}

/// Pulls the latest committed news digest into the monitoring run.
pub struct LoadNewsContext;

#[async_trait]
impl FunctionStage for LoadNewsContext {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let news_state = ctx.cross_state(workflows::NEWS_DIGEST)?;
        match news_state.get(state_keys::NEWS_DIGEST) {
            Some(artifact @ Artifact::NewsDigest(_)) => {
                state.set(state_keys::NEWS_DIGEST, artifact.clone());
                Ok(StageFlow::Continue(artifact.clone()))
            }
            _ => Ok(StageFlow::Continue(Artifact::Null)),
        }
    }
}

/// Runs one monitor tick and routes its commands through the engine.
pub struct MonitorTick {
    pub monitor: Arc<PositionMonitor>,
    pub engine: Arc<ExecutionEngine>,
    pub venue_offset: FixedOffset,
}

#[async_trait]
impl FunctionStage for MonitorTick {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let digest = state
            .get(state_keys::NEWS_DIGEST)
            .and_then(Artifact::as_news_digest)
            .cloned();
        let now_local = chrono::Utc::now()
            .with_timezone(&self.venue_offset)
            .time();

        let summary = self
            .monitor
            .tick(ctx.session_id, digest.as_ref(), now_local, ctx.now_ms)
            .await
            .map_err(|e| StageError::Other(e.to_string()))?;

        let results = self.engine.apply_commands(&summary.commands).await;
        let applied = results.iter().filter(|r| r.is_ok()).count();

        let value = json!({
            "open_trades": summary.open_trades,
            "commands": serde_json::to_value(&summary.commands)
                .map_err(|e| StageError::Other(e.to_string()))?,
            "applied": applied,
            "unpriced": summary.unpriced,
        });
        state.set(state_keys::MONITORING, Artifact::Json(value.clone()));
        Ok(StageFlow::Continue(Artifact::Json(value)))
    }
}

/// Merges a fresh digest additively into the day's running digest.
pub struct MergeDigest;

#[async_trait]
impl FunctionStage for MergeDigest {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let fresh = ctx
            .previous
            .and_then(Artifact::as_news_digest)
            .ok_or_else(|| StageError::MissingStep("news digest".into()))?;

        let merged = match state
            .get(state_keys::NEWS_DIGEST)
            .and_then(Artifact::as_news_digest)
        {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge_from(fresh);
                merged
            }
            None => fresh.clone(),
        };

        state.set(
            state_keys::NEWS_DIGEST,
            Artifact::NewsDigest(merged.clone()),
        );
        Ok(StageFlow::Continue(Artifact::NewsDigest(merged)))
    }
}

/// Composes the end-of-day report from ledger truth and analysis history.
pub struct ComposeDayReport {
    pub engine: Arc<ExecutionEngine>,
    pub history_depth: usize,
}

#[async_trait]
impl FunctionStage for ComposeDayReport {
    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        state: &mut SessionState,
    ) -> Result<StageFlow, StageError> {
        let ledger = self.engine.ledger();
        let trades = ledger.by_date(ctx.session_id);

        let closed: Vec<_> = trades.iter().filter(|t| t.status.is_terminal()).collect();
        let winners = closed
            .iter()
            .filter(|t| t.realized_pnl.unwrap_or(Decimal::ZERO) > Decimal::ZERO)
            .count();
        let hit_rate = if closed.is_empty() {
            None
        } else {
            Some(Decimal::from(winners as u32) / Decimal::from(closed.len() as u32))
        };

        let realized = ledger.realized_pnl(ctx.session_id);

        // Mark anything still open against the latest quotes.
        let open_symbols: Vec<Symbol> = trades
            .iter()
            .filter(|t| t.status.is_live())
            .map(|t| t.symbol().clone())
            .collect();
        let prices: HashMap<Symbol, Decimal> = if open_symbols.is_empty() {
            HashMap::new()
        } else {
            match ctx.ports.broker.get_quotes(&open_symbols).await {
                Ok(quotes) => quotes.into_iter().map(|q| (q.symbol.clone(), q.last_price)).collect(),
                Err(e) => {
                    warn!(error = %e, "quotes unavailable for unrealized roll-up");
                    HashMap::new()
                }
            }
        };
        let unrealized = ledger.unrealized_pnl(ctx.session_id, |s| prices.get(s).copied());

        // Score each contributing analyst against how its trades resolved.
        let analysis = ctx.cross_state(workflows::INTRADAY_ANALYSIS)?;
        let candidates = analysis
            .get(state_keys::CANDIDATES)
            .and_then(Artifact::as_candidates)
            .map(<[Candidate]>::to_vec)
            .unwrap_or_default();
        let accuracy = crate::read_model::score_analysts(&candidates, &trades);

        // The prior days' analysis runs inform the lessons.
        let history = ctx.history_of(workflows::INTRADAY_ANALYSIS, self.history_depth)?;
        let mut lessons = Vec::new();
        if let Some(rate) = hit_rate {
            if rate < Decimal::new(4, 1) {
                lessons.push("hit rate below 40%: revisit candidate consensus threshold".to_string());
            }
        }
        let news_exits = closed
            .iter()
            .filter(|t| matches!(t.exit_reason, Some(model::ExitReason::NewsInvalidation)))
            .count();
        if news_exits > 0 {
            lessons.push(format!(
                "{news_exits} position(s) closed on news invalidation; weight market-intel earlier"
            ));
        }
        if history.len() >= 2 {
            lessons.push(format!(
                "compared against {} prior analysis runs",
                history.len()
            ));
        }

        let report = model::DayReport {
            date: ctx.session_id.to_string(),
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            hit_rate,
            analyst_accuracy: accuracy,
            lessons,
        };
        state.set(state_keys::DAY_REPORT, Artifact::DayReport(report.clone()));
        Ok(StageFlow::Continue(Artifact::DayReport(report)))
    }
}
