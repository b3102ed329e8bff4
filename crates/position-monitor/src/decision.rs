//! The per-trade decision table and the session-wide loss guard.
//!
//! Pure functions: identical inputs always produce identical commands, so
//! two monitor runs over the same state emit the same modifications.

use crate::MonitorConfig;
use chrono::NaiveTime;
use execution_engine::TradeCommand;
use model::{Direction, ExitReason, NewsDigest, Trade};
use rust_decimal::Decimal;

/// Everything the decision table needs to know about one open trade.
#[derive(Debug, Clone)]
pub struct TradeSnapshot {
    pub trade: Trade,
    /// Last traded price.
    pub price: Decimal,
    /// Rolling ATR, when enough history exists.
    pub atr: Option<Decimal>,
}

/// Decision table for one open trade, in precedence order: flatten,
/// news invalidation, imminent stop, harvest, trail/tighten.
pub fn decide(
    snapshot: &TradeSnapshot,
    digest: Option<&NewsDigest>,
    now_local: NaiveTime,
    config: &MonitorConfig,
) -> Vec<TradeCommand> {
    let trade = &snapshot.trade;
    let mut commands = Vec::new();

    // After flatten time nothing stays open.
    if now_local >= config.flatten_time {
        commands.push(TradeCommand::Close {
            trade_id: trade.trade_id.clone(),
            reason: ExitReason::TimeExit,
            rationale: format!("flatten time {} reached", config.flatten_time),
        });
        return commands;
    }

    let is_long = trade.direction() == Direction::Long;

    // News that invalidates the thesis closes the trade proactively.
    if let Some(digest) = digest {
        if digest.invalidates(trade.symbol(), is_long) {
            commands.push(TradeCommand::Close {
                trade_id: trade.trade_id.clone(),
                reason: ExitReason::NewsInvalidation,
                rationale: format!(
                    "digest sentiment {} names {}",
                    digest.sentiment.as_str(),
                    trade.symbol()
                ),
            });
            return commands;
        }
    }

    let r = snapshot.price_r();

    // A loser drifting into its stop is closed instead of waiting for the
    // fill at the worst price.
    if let Some(atr) = snapshot.atr {
        if r < Decimal::ZERO && snapshot.stop_distance() <= atr * config.stop_proximity_atr {
            commands.push(TradeCommand::Close {
                trade_id: trade.trade_id.clone(),
                reason: ExitReason::MonitorClose,
                rationale: "price within proximity band of the stop".into(),
            });
            return commands;
        }
    }

    // Harvest part of a strong winner once, leaving the rest to run.
    if r >= config.partial_trigger_r && trade.remaining_qty == trade.filled_qty {
        let quantity = harvest_quantity(trade.remaining_qty, config.partial_fraction);
        if quantity > 0 && quantity < trade.remaining_qty {
            commands.push(TradeCommand::PartialExit {
                trade_id: trade.trade_id.clone(),
                quantity,
                rationale: format!("booking partial at {r:.2}R"),
            });
        }
    }

    // Trail winners; tighten everything into the close.
    let k = if now_local >= config.close_tighten_time {
        Some(config.tighten_atr_k)
    } else if r >= config.trail_trigger_r {
        Some(config.trail_atr_k)
    } else {
        None
    };
    if let (Some(k), Some(atr)) = (k, snapshot.atr) {
        let candidate = if is_long {
            snapshot.price - k * atr
        } else {
            snapshot.price + k * atr
        };
        let new_stop = clamp_toward_trade(trade.current_stop, candidate, is_long);
        if new_stop != trade.current_stop {
            commands.push(TradeCommand::ModifyStop {
                trade_id: trade.trade_id.clone(),
                new_stop,
                rationale: format!("trail to {k}xATR off {}", snapshot.price),
            });
        }
    }

    commands
}

/// Session-wide guard: if the sum of worst-case losses at current stops
/// would breach the daily-loss floor, tighten every stop proportionally
/// until it does not.
///
/// `effective_stops` lets the caller account for stop moves already
/// decided this tick.
pub fn cumulative_guard(
    snapshots: &[TradeSnapshot],
    effective_stops: &dyn Fn(&Trade) -> Decimal,
    realized_pnl: Decimal,
    config: &MonitorConfig,
) -> Vec<TradeCommand> {
    let mut worst_total = Decimal::ZERO;
    let mut per_trade: Vec<(&TradeSnapshot, Decimal)> = Vec::new();
    for snapshot in snapshots {
        let stop = effective_stops(&snapshot.trade);
        let loss = worst_case_loss(&snapshot.trade, stop);
        if loss > Decimal::ZERO {
            worst_total += loss;
            per_trade.push((snapshot, loss));
        }
    }

    // Invariant to preserve: realized - worst_total >= -floor.
    let headroom = config.daily_loss_floor + realized_pnl;
    if worst_total <= headroom || worst_total.is_zero() {
        return Vec::new();
    }
    let scale = (headroom.max(Decimal::ZERO)) / worst_total;

    let mut commands = Vec::new();
    for (snapshot, loss) in per_trade {
        let trade = &snapshot.trade;
        let qty = Decimal::from(trade.remaining_qty.max(1));
        let allowed_per_share = loss * scale / qty;
        let entry = trade
            .entry_fill_price
            .unwrap_or(trade.approved_order.entry_price);
        let candidate = match trade.direction() {
            Direction::Long => entry - allowed_per_share,
            Direction::Short => entry + allowed_per_share,
        };
        let current = effective_stops(trade);
        let is_long = trade.direction() == Direction::Long;
        let new_stop = clamp_toward_trade(current, candidate, is_long);
        if new_stop != current {
            commands.push(TradeCommand::ModifyStop {
                trade_id: trade.trade_id.clone(),
                new_stop,
                rationale: "proportional tighten: daily loss floor guard".into(),
            });
        }
    }
    commands
}

impl TradeSnapshot {
    /// Current profit in R-multiples (zero when unknown).
    pub fn price_r(&self) -> Decimal {
        self.trade.r_multiple(self.price).unwrap_or(Decimal::ZERO)
    }

    /// Distance between price and the current stop.
    pub fn stop_distance(&self) -> Decimal {
        (self.price - self.trade.current_stop).abs()
    }
}

/// Worst-case further loss if the given stop fills exactly.
fn worst_case_loss(trade: &Trade, stop: Decimal) -> Decimal {
    let entry = trade
        .entry_fill_price
        .unwrap_or(trade.approved_order.entry_price);
    let qty = Decimal::from(trade.remaining_qty);
    match trade.direction() {
        Direction::Long => (entry - stop) * qty,
        Direction::Short => (stop - entry) * qty,
    }
}

/// Move the stop only in the trade's favour.
fn clamp_toward_trade(current: Decimal, candidate: Decimal, is_long: bool) -> Decimal {
    if is_long {
        current.max(candidate)
    } else {
        current.min(candidate)
    }
}

/// Largest whole-lot quantity at or below the fraction of the position.
fn harvest_quantity(remaining: u32, fraction: Decimal) -> u32 {
    use rust_decimal::prelude::ToPrimitive;
    (Decimal::from(remaining) * fraction)
        .floor()
        .to_u32()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{ApprovedOrder, EntryType, ProductType, Sentiment, Symbol, TradeStatus};
    use rust_decimal_macros::dec;

    fn open_trade(entry: Decimal, stop: Decimal, tp: Decimal, qty: u32) -> Trade {
        let order = ApprovedOrder::new(
            "c1",
            Symbol::new("NSE:SYMB-EQ"),
            Direction::Long,
            qty,
            EntryType::Limit,
            entry,
            stop,
            tp,
            ProductType::Intraday,
            "t",
            1,
            Decimal::from(1_000_000),
        )
        .unwrap();
        let mut trade = Trade::from_approved("t1", "2025-01-06", order, 0);
        trade.status = TradeStatus::Open;
        trade.entry_fill_price = Some(entry);
        trade.filled_qty = qty;
        trade.remaining_qty = qty;
        trade
    }

    fn midday() -> NaiveTime {
        NaiveTime::from_hms_opt(11, 0, 0).unwrap()
    }

    fn config() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[test]
    fn test_trailing_stop_to_breakeven() {
        // Long at 500, stop 495, ATR 3, trail trigger 1R. Price at 506 is
        // 1.2R; the stop moves to max(495, 506 - 2*3) = 500.
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(506),
            atr: Some(dec!(3)),
        };

        let commands = decide(&snapshot, None, midday(), &config());
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            TradeCommand::ModifyStop { new_stop, .. } => assert_eq!(*new_stop, dec!(500)),
            other => panic!("expected stop move, got {other:?}"),
        }
    }

    #[test]
    fn test_trail_never_moves_against_the_trade() {
        // Stop already at 505; the trail candidate 500 must not loosen it.
        let mut trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        trade.current_stop = dec!(505);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(506),
            atr: Some(dec!(3)),
        };

        let commands = decide(&snapshot, None, midday(), &config());
        assert!(commands.is_empty());
    }

    #[test]
    fn test_no_trail_below_trigger() {
        // 0.4R is below the 1R trigger: nothing happens.
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(502),
            atr: Some(dec!(3)),
        };
        assert!(decide(&snapshot, None, midday(), &config()).is_empty());
    }

    #[test]
    fn test_news_invalidation_closes_long() {
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let digest = NewsDigest {
            produced_at_ms: 0,
            key_events: vec!["sector downgrade".into()],
            sentiment: Sentiment::RiskOff,
            affected_symbols: vec![Symbol::new("NSE:SYMB-EQ")],
        };
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(501),
            atr: Some(dec!(3)),
        };

        let commands = decide(&snapshot, Some(&digest), midday(), &config());
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0],
            TradeCommand::Close { reason: ExitReason::NewsInvalidation, .. }
        ));
    }

    #[test]
    fn test_risk_on_does_not_touch_longs() {
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let digest = NewsDigest {
            produced_at_ms: 0,
            key_events: vec![],
            sentiment: Sentiment::RiskOn,
            affected_symbols: vec![Symbol::new("NSE:SYMB-EQ")],
        };
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(501),
            atr: Some(dec!(3)),
        };
        assert!(decide(&snapshot, Some(&digest), midday(), &config()).is_empty());
    }

    #[test]
    fn test_loser_near_stop_closed_proactively() {
        // Price 495.5, stop 495, ATR 3: distance 0.5 < 0.25 * 3.
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(495.5),
            atr: Some(dec!(3)),
        };
        let commands = decide(&snapshot, None, midday(), &config());
        assert!(matches!(
            &commands[0],
            TradeCommand::Close { reason: ExitReason::MonitorClose, .. }
        ));
    }

    #[test]
    fn test_partial_harvest_at_trigger() {
        // 2R winner: harvest half, trail the rest.
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(510),
            atr: Some(dec!(3)),
        };
        let commands = decide(&snapshot, None, midday(), &config());
        assert_eq!(commands.len(), 2);
        assert!(matches!(
            &commands[0],
            TradeCommand::PartialExit { quantity: 5, .. }
        ));
        assert!(matches!(&commands[1], TradeCommand::ModifyStop { .. }));
    }

    #[test]
    fn test_harvest_only_once() {
        // remaining < filled means a harvest already happened.
        let mut trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        trade.remaining_qty = 5;
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(510),
            atr: Some(dec!(3)),
        };
        let commands = decide(&snapshot, None, midday(), &config());
        assert!(commands
            .iter()
            .all(|c| !matches!(c, TradeCommand::PartialExit { .. })));
    }

    #[test]
    fn test_tighten_after_cutoff() {
        // After the tighten time even a modest winner pulls the stop to
        // 0.75 ATR off the price.
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(502),
            atr: Some(dec!(3)),
        };
        let late = NaiveTime::from_hms_opt(14, 50, 0).unwrap();
        let commands = decide(&snapshot, None, late, &config());
        match &commands[0] {
            TradeCommand::ModifyStop { new_stop, .. } => {
                assert_eq!(*new_stop, dec!(499.75));
            }
            other => panic!("expected tighten, got {other:?}"),
        }
    }

    #[test]
    fn test_flatten_after_cutoff() {
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(502),
            atr: Some(dec!(3)),
        };
        let late = NaiveTime::from_hms_opt(15, 15, 0).unwrap();
        let commands = decide(&snapshot, None, late, &config());
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0],
            TradeCommand::Close { reason: ExitReason::TimeExit, .. }
        ));
    }

    #[test]
    fn test_decisions_are_deterministic() {
        let trade = open_trade(dec!(500), dec!(495), dec!(520), 10);
        let snapshot = TradeSnapshot {
            trade,
            price: dec!(506),
            atr: Some(dec!(3)),
        };
        let first = decide(&snapshot, None, midday(), &config());
        let second = decide(&snapshot, None, midday(), &config());
        assert_eq!(first, second);
    }

    #[test]
    fn test_cumulative_guard_tightens_proportionally() {
        // Two longs each risking 500 at their stops; floor is 600 with no
        // realized P&L, so stops must tighten to cut total risk to 600.
        let mut a = open_trade(dec!(100), dec!(99), dec!(103), 500);
        a.trade_id = "a".into();
        let mut b = open_trade(dec!(200), dec!(198), dec!(206), 250);
        b.trade_id = "b".into();
        let snapshots = vec![
            TradeSnapshot { trade: a, price: dec!(100), atr: None },
            TradeSnapshot { trade: b, price: dec!(200), atr: None },
        ];

        let mut config = config();
        config.daily_loss_floor = dec!(600);
        let commands = cumulative_guard(
            &snapshots,
            &|t: &Trade| t.current_stop,
            Decimal::ZERO,
            &config,
        );
        assert_eq!(commands.len(), 2);

        // Recompute the worst case with the new stops: it must respect the
        // floor.
        let mut new_stops = std::collections::HashMap::new();
        for command in &commands {
            if let TradeCommand::ModifyStop { trade_id, new_stop, .. } = command {
                new_stops.insert(trade_id.clone(), *new_stop);
            }
        }
        let total: Decimal = snapshots
            .iter()
            .map(|s| {
                let stop = new_stops
                    .get(&s.trade.trade_id)
                    .copied()
                    .unwrap_or(s.trade.current_stop);
                super::worst_case_loss(&s.trade, stop)
            })
            .sum();
        assert!(total <= dec!(600), "worst case after tighten was {total}");
        // Stops only moved toward the trades.
        for s in &snapshots {
            let stop = new_stops[&s.trade.trade_id];
            assert!(stop > s.trade.current_stop);
        }
    }

    #[test]
    fn test_cumulative_guard_idle_under_floor() {
        let trade = open_trade(dec!(100), dec!(99), dec!(103), 500);
        let snapshots = vec![TradeSnapshot {
            trade,
            price: dec!(100),
            atr: None,
        }];
        let mut config = config();
        config.daily_loss_floor = dec!(2000);
        let commands =
            cumulative_guard(&snapshots, &|t: &Trade| t.current_stop, Decimal::ZERO, &config);
        assert!(commands.is_empty());
    }

    #[test]
    fn test_guard_accounts_for_realized_losses() {
        // A realized loss of 300 shrinks the remaining headroom.
        let trade = open_trade(dec!(100), dec!(99), dec!(103), 500);
        let snapshots = vec![TradeSnapshot {
            trade,
            price: dec!(100),
            atr: None,
        }];
        let mut config = config();
        config.daily_loss_floor = dec!(600);
        // Worst case 500 fits the floor alone, but realized -300 leaves
        // only 300 of headroom.
        let commands =
            cumulative_guard(&snapshots, &|t: &Trade| t.current_stop, dec!(-300), &config);
        assert_eq!(commands.len(), 1);
    }
}
