//! Risk sizing: candidates in, approved orders out.
//!
//! Domain-policy rejections (caps, floors) are not errors; the sizer
//! returns an approved set of size 0..N plus an explanatory record for
//! every candidate it skipped.

use broker_core::Quote;
use model::{
    ApprovedOrder, Candidate, Direction, EntryType, ProductType, Regime, Symbol,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Injected risk configuration. All figures are configuration, never
/// constants in decision code.
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Account capital the percentages reference.
    pub capital: Decimal,
    /// Maximum loss one trade may risk (absolute).
    pub per_trade_risk: Decimal,
    /// Session-wide cumulative loss boundary (absolute).
    pub daily_loss_floor: Decimal,
    /// Maximum simultaneous positions per day.
    pub max_positions: usize,
    /// Maximum positions per sector.
    pub max_per_sector: usize,
    /// Minimum |take_profit - entry| as a fraction of entry.
    pub target_move: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        let capital = Decimal::from(100_000);
        Self {
            capital,
            // 1% risk per trade, 2% daily loss floor.
            per_trade_risk: capital * Decimal::new(1, 2),
            daily_loss_floor: capital * Decimal::new(2, 2),
            max_positions: 15,
            max_per_sector: 3,
            target_move: Decimal::new(1, 2),
        }
    }
}

/// Why a candidate was not sized into an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Regime multiplier or stop distance left no whole lot to buy.
    RiskTooSmall,
    /// Sector already holds its maximum positions.
    SectorCapReached,
    /// The day's position budget is exhausted.
    MaxPositionsReached,
    /// Adding this order would push cumulative worst-case loss past the
    /// daily loss floor.
    DailyFloorReached,
    /// No quote available to price the entry.
    NoQuote,
    /// The order failed its own construction invariants.
    Invalid,
}

impl SkipReason {
    /// Human-readable tag for reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskTooSmall => "risk_too_small",
            Self::SectorCapReached => "sector_cap_reached",
            Self::MaxPositionsReached => "max_positions_reached",
            Self::DailyFloorReached => "daily_floor_reached",
            Self::NoQuote => "no_quote",
            Self::Invalid => "invalid",
        }
    }
}

/// Explanatory record for a skipped candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub candidate_id: String,
    pub symbol: Symbol,
    pub reason: SkipReason,
}

/// Result of sizing one candidate batch.
#[derive(Debug, Clone, Default)]
pub struct SizingOutcome {
    pub approved: Vec<ApprovedOrder>,
    pub skipped: Vec<SkippedCandidate>,
}

/// Per-symbol inputs the sizer needs.
pub struct SizingContext<'a> {
    /// Lot size per symbol (1 for cash equities).
    pub lot_size: &'a dyn Fn(&Symbol) -> u32,
    /// Sector bucket per symbol, when known.
    pub sector: &'a dyn Fn(&Symbol) -> Option<String>,
    /// Latest quotes, used for the entry-type decision.
    pub quotes: &'a HashMap<Symbol, Quote>,
    /// Liquidity threshold: relative spread (percent) at or below which a
    /// symbol is liquid.
    pub liquid_spread_pct: Decimal,
    /// Composite score magnitude from which a pick counts as momentum.
    pub momentum_score: Decimal,
    /// Limit offset fraction for illiquid entries.
    pub illiquid_limit_offset: Decimal,
}

/// Size candidates into approved orders under the regime multiplier and
/// the batch-level caps.
///
/// Candidates are processed in descending composite-score order so the
/// highest-conviction picks claim the risk budget first.
pub fn size_candidates(
    candidates: &[Candidate],
    regime: &Regime,
    limits: &RiskLimits,
    ctx: &SizingContext<'_>,
) -> SizingOutcome {
    let mut outcome = SizingOutcome::default();
    if regime.is_halted() || regime.position_multiplier.is_zero() {
        outcome.skipped = candidates
            .iter()
            .map(|c| SkippedCandidate {
                candidate_id: c.candidate_id.clone(),
                symbol: c.symbol.clone(),
                reason: SkipReason::RiskTooSmall,
            })
            .collect();
        return outcome;
    }

    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        b.composite_score
            .abs()
            .cmp(&a.composite_score.abs())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    let risk_budget = limits.per_trade_risk * regime.position_multiplier;
    let mut committed_risk = Decimal::ZERO;
    let mut sector_counts: HashMap<String, usize> = HashMap::new();

    for candidate in ordered {
        let skip = |reason: SkipReason, outcome: &mut SizingOutcome| {
            outcome.skipped.push(SkippedCandidate {
                candidate_id: candidate.candidate_id.clone(),
                symbol: candidate.symbol.clone(),
                reason,
            });
        };

        if outcome.approved.len() >= limits.max_positions {
            skip(SkipReason::MaxPositionsReached, &mut outcome);
            continue;
        }

        let sector = (ctx.sector)(&candidate.symbol);
        if let Some(sector) = &sector {
            if sector_counts.get(sector).copied().unwrap_or(0) >= limits.max_per_sector {
                skip(SkipReason::SectorCapReached, &mut outcome);
                continue;
            }
        }

        // Entry reference is the near edge of the band: the worst
        // acceptable price that still satisfies the risk arithmetic.
        let entry_price = match candidate.direction {
            Direction::Long => candidate.entry_low,
            Direction::Short => candidate.entry_high,
        };
        let stop_distance = (entry_price - candidate.stop_loss).abs();
        if stop_distance.is_zero() {
            skip(SkipReason::RiskTooSmall, &mut outcome);
            continue;
        }

        let lot = (ctx.lot_size)(&candidate.symbol).max(1);
        let raw_qty = (risk_budget / stop_distance)
            .floor()
            .to_u32()
            .unwrap_or(0);
        let quantity = raw_qty - raw_qty % lot;
        if quantity == 0 {
            skip(SkipReason::RiskTooSmall, &mut outcome);
            continue;
        }

        let order_risk = Decimal::from(quantity) * stop_distance;
        if committed_risk + order_risk > limits.daily_loss_floor {
            skip(SkipReason::DailyFloorReached, &mut outcome);
            continue;
        }

        let quote = ctx.quotes.get(&candidate.symbol);
        let entry_type = choose_entry_type(candidate, quote, ctx);
        let entry_price = match entry_type {
            EntryType::Market => entry_price,
            EntryType::Limit => limit_price(candidate, entry_price, quote, ctx),
        };

        match ApprovedOrder::new(
            candidate.candidate_id.clone(),
            candidate.symbol.clone(),
            candidate.direction,
            quantity,
            entry_type,
            entry_price,
            candidate.stop_loss,
            candidate.take_profit,
            ProductType::Intraday,
            format!("auto:{}", candidate.candidate_id),
            lot,
            risk_budget,
        ) {
            Ok(order) => {
                committed_risk += order.risk_amount();
                if let Some(sector) = sector {
                    *sector_counts.entry(sector).or_insert(0) += 1;
                }
                outcome.approved.push(order);
            }
            Err(_) => skip(SkipReason::Invalid, &mut outcome),
        }
    }

    info!(
        approved = outcome.approved.len(),
        skipped = outcome.skipped.len(),
        committed_risk = %committed_risk,
        "sizing complete"
    );
    outcome
}

/// High-liquidity momentum picks may go to market; everything else works
/// a limit, illiquid names never market.
fn choose_entry_type(
    candidate: &Candidate,
    quote: Option<&Quote>,
    ctx: &SizingContext<'_>,
) -> EntryType {
    let liquid = quote
        .and_then(Quote::spread_pct)
        .is_some_and(|spread| spread <= ctx.liquid_spread_pct);
    let momentum = candidate.composite_score.abs() >= ctx.momentum_score;
    if liquid && momentum {
        EntryType::Market
    } else {
        EntryType::Limit
    }
}

/// Limit price for a limit entry: at touch for liquid names, offset into
/// the book for illiquid ones.
fn limit_price(
    candidate: &Candidate,
    band_edge: Decimal,
    quote: Option<&Quote>,
    ctx: &SizingContext<'_>,
) -> Decimal {
    let liquid = quote
        .and_then(Quote::spread_pct)
        .is_some_and(|spread| spread <= ctx.liquid_spread_pct);
    if liquid {
        return band_edge;
    }
    let offset = band_edge * ctx.illiquid_limit_offset;
    match candidate.direction {
        Direction::Long => band_edge - offset,
        Direction::Short => band_edge + offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::RegimeState;
    use rust_decimal_macros::dec;

    fn calm_regime() -> Regime {
        Regime::new(RegimeState::Calm, dec!(11), dec!(1.0), 0).unwrap()
    }

    fn candidate(id: &str, symbol: &str, score: Decimal) -> Candidate {
        Candidate::new(
            id,
            Symbol::new(symbol),
            Direction::Long,
            score,
            dec!(0.82),
            dec!(100.0),
            dec!(100.2),
            dec!(99.0),
            dec!(101.2),
            dec!(0.01),
            vec![],
        )
        .unwrap()
    }

    fn ctx<'a>(quotes: &'a HashMap<Symbol, Quote>) -> SizingContext<'a> {
        SizingContext {
            lot_size: &|_| 1,
            sector: &|_| Some("ENERGY".into()),
            quotes,
            liquid_spread_pct: dec!(0.15),
            momentum_score: dec!(5),
            illiquid_limit_offset: dec!(0.001),
        }
    }

    fn limits(per_trade_risk: Decimal, floor: Decimal) -> RiskLimits {
        RiskLimits {
            per_trade_risk,
            daily_loss_floor: floor,
            ..RiskLimits::default()
        }
    }

    #[test]
    fn test_quantity_from_risk_and_stop_distance() {
        let quotes = HashMap::new();
        let outcome = size_candidates(
            &[candidate("c1", "NSE:SYMA-EQ", dec!(8))],
            &calm_regime(),
            &limits(dec!(500), dec!(2000)),
            &ctx(&quotes),
        );

        assert_eq!(outcome.approved.len(), 1);
        let order = &outcome.approved[0];
        // per_trade_risk 500 / stop distance 1.0 = 500 shares.
        assert_eq!(order.quantity, 500);
        assert_eq!(order.entry_price, dec!(100.0));
        assert_eq!(order.risk_amount(), dec!(500.0));
    }

    #[test]
    fn test_regime_multiplier_scales_size() {
        let quotes = HashMap::new();
        let reduced = Regime::new(RegimeState::Elevated, dec!(22), dec!(0.5), 0).unwrap();
        let outcome = size_candidates(
            &[candidate("c1", "NSE:SYMA-EQ", dec!(8))],
            &reduced,
            &limits(dec!(500), dec!(2000)),
            &ctx(&quotes),
        );
        assert_eq!(outcome.approved[0].quantity, 250);
    }

    #[test]
    fn test_halt_regime_sizes_nothing() {
        let quotes = HashMap::new();
        let halt = Regime::new(RegimeState::Halt, dec!(35), dec!(0), 0).unwrap();
        let outcome = size_candidates(
            &[candidate("c1", "NSE:SYMA-EQ", dec!(8))],
            &halt,
            &limits(dec!(500), dec!(2000)),
            &ctx(&quotes),
        );
        assert!(outcome.approved.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn test_sector_cap() {
        let quotes = HashMap::new();
        let candidates: Vec<Candidate> = (0..5)
            .map(|i| candidate(&format!("c{i}"), &format!("NSE:SYM{i}-EQ"), dec!(8)))
            .collect();
        // Every candidate maps to ENERGY; the cap is 3 per sector.
        let outcome = size_candidates(
            &candidates,
            &calm_regime(),
            &limits(dec!(100), dec!(10000)),
            &ctx(&quotes),
        );
        assert_eq!(outcome.approved.len(), 3);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::SectorCapReached));
    }

    #[test]
    fn test_daily_floor_caps_cumulative_risk() {
        let quotes = HashMap::new();
        let candidates: Vec<Candidate> = (0..4)
            .map(|i| candidate(&format!("c{i}"), &format!("NSE:SYM{i}-EQ"), dec!(8)))
            .collect();
        let mut limits = limits(dec!(500), dec!(1000));
        limits.max_per_sector = 10;
        // Each order risks 500; the floor admits two.
        let outcome = size_candidates(&candidates, &calm_regime(), &limits, &ctx(&quotes));
        assert_eq!(outcome.approved.len(), 2);
        assert_eq!(
            outcome
                .skipped
                .iter()
                .filter(|s| s.reason == SkipReason::DailyFloorReached)
                .count(),
            2
        );
    }

    #[test]
    fn test_lot_alignment_rounds_down() {
        let quotes = HashMap::new();
        let sizing_ctx = SizingContext {
            lot_size: &|_| 150,
            sector: &|_| None,
            quotes: &quotes,
            liquid_spread_pct: dec!(0.15),
            momentum_score: dec!(5),
            illiquid_limit_offset: dec!(0.001),
        };
        let outcome = size_candidates(
            &[candidate("c1", "NSE:SYMA-EQ", dec!(8))],
            &calm_regime(),
            &limits(dec!(500), dec!(2000)),
            &sizing_ctx,
        );
        // 500 raw shares rounds down to 3 lots of 150.
        assert_eq!(outcome.approved[0].quantity, 450);
    }

    #[test]
    fn test_high_conviction_claims_budget_first() {
        let quotes = HashMap::new();
        let mut limits = limits(dec!(500), dec!(500));
        limits.max_per_sector = 10;
        let weak = candidate("weak", "NSE:SYMA-EQ", dec!(5));
        let strong = candidate("strong", "NSE:SYMB-EQ", dec!(9));
        let outcome = size_candidates(
            &[weak, strong],
            &calm_regime(),
            &limits,
            &ctx(&quotes),
        );
        assert_eq!(outcome.approved.len(), 1);
        assert_eq!(outcome.approved[0].candidate_id, "strong");
    }

    #[test]
    fn test_entry_type_choice() {
        let symbol = Symbol::new("NSE:SYMA-EQ");
        let mut quotes = HashMap::new();
        quotes.insert(
            symbol.clone(),
            Quote {
                symbol: symbol.clone(),
                last_price: dec!(100.1),
                change: dec!(0),
                change_pct: dec!(0),
                volume: 1_000_000,
                bid: dec!(100.05),
                ask: dec!(100.15),
                timestamp_ms: 0,
            },
        );

        // Liquid + momentum: market entry.
        let outcome = size_candidates(
            &[candidate("c1", "NSE:SYMA-EQ", dec!(8))],
            &calm_regime(),
            &limits(dec!(500), dec!(2000)),
            &ctx(&quotes),
        );
        assert_eq!(outcome.approved[0].entry_type, EntryType::Market);

        // Liquid but low conviction: limit at touch.
        let outcome = size_candidates(
            &[candidate("c2", "NSE:SYMA-EQ", dec!(3))],
            &calm_regime(),
            &limits(dec!(500), dec!(2000)),
            &ctx(&quotes),
        );
        assert_eq!(outcome.approved[0].entry_type, EntryType::Limit);
        assert_eq!(outcome.approved[0].entry_price, dec!(100.0));

        // No quote: never market, offset limit.
        let empty = HashMap::new();
        let outcome = size_candidates(
            &[candidate("c3", "NSE:SYMA-EQ", dec!(8))],
            &calm_regime(),
            &limits(dec!(500), dec!(2000)),
            &ctx(&empty),
        );
        assert_eq!(outcome.approved[0].entry_type, EntryType::Limit);
        assert_eq!(outcome.approved[0].entry_price, dec!(99.9000));
    }
}
