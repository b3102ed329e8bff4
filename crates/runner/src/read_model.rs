//! Read model the UI/API layer queries.

use model::{AnalystAccuracy, Candidate, DayReport, Direction, Trade};
use rust_decimal::Decimal;
use scheduler::workflows;
use session_store::{SessionStore, StoreError, WorkflowSession};
use std::collections::BTreeMap;
use trade_ledger::TradeLedger;

/// One workflow session for a trading date.
pub fn session(
    store: &SessionStore,
    workflow: &str,
    date: &str,
) -> Result<Option<WorkflowSession>, StoreError> {
    store.get_session(workflow, date)
}

/// All trades for a trading date, in trade-id order.
pub fn trades(ledger: &TradeLedger, date: &str) -> Vec<Trade> {
    ledger.by_date(date)
}

/// The day report, once the post-trade workflow has produced one.
pub fn day_report(store: &SessionStore, date: &str) -> Result<Option<DayReport>, StoreError> {
    let state = store.session_state(workflows::POST_TRADE_ANALYSIS, date)?;
    Ok(state
        .get(model::state_keys::DAY_REPORT)
        .and_then(|a| match a {
            model::Artifact::DayReport(report) => Some(report.clone()),
            _ => None,
        }))
}

/// Score contributing analysts against how their trades resolved.
///
/// A signal counts as correct when its sign agreed with the trade's
/// direction and the trade realized a profit, or disagreed and the trade
/// realized a loss.
pub fn score_analysts(candidates: &[Candidate], trades: &[Trade]) -> Vec<AnalystAccuracy> {
    let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();

    for trade in trades {
        let Some(realized) = trade.realized_pnl else {
            continue;
        };
        if !trade.status.is_terminal() {
            continue;
        }
        let Some(candidate) = candidates
            .iter()
            .find(|c| c.candidate_id == trade.approved_order.candidate_id)
        else {
            continue;
        };

        let profitable = realized > Decimal::ZERO;
        for signal in &candidate.contributing_signals {
            let bullish = signal.score > 0;
            let agreed_with_trade = match trade.direction() {
                Direction::Long => bullish,
                Direction::Short => !bullish,
            };
            let correct = agreed_with_trade == profitable;

            let tally = tallies.entry(signal.analyst_id.clone()).or_insert((0, 0));
            tally.0 += 1;
            if correct {
                tally.1 += 1;
            }
        }
    }

    tallies
        .into_iter()
        .map(|(analyst_id, (scored, correct))| AnalystAccuracy {
            analyst_id,
            signals_scored: scored,
            signals_correct: correct,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        ApprovedOrder, EntryType, ProductType, ScoreRange, StockSignal, Symbol, TradeStatus,
    };
    use rust_decimal_macros::dec;

    fn candidate_with_signals() -> Candidate {
        let signal = |analyst: &str, score: i32| {
            StockSignal::new(
                Symbol::new("NSE:TCS-EQ"),
                analyst,
                score,
                ScoreRange::symmetric(5),
                dec!(0.8),
                "",
                0,
            )
            .unwrap()
        };
        Candidate::new(
            "c1",
            Symbol::new("NSE:TCS-EQ"),
            Direction::Long,
            dec!(7),
            dec!(0.8),
            dec!(100.0),
            dec!(100.2),
            dec!(99.0),
            dec!(101.5),
            dec!(0.01),
            vec![signal("technical", 4), signal("derivatives", -1)],
        )
        .unwrap()
    }

    fn closed_trade(pnl: Decimal) -> Trade {
        let order = ApprovedOrder::new(
            "c1",
            Symbol::new("NSE:TCS-EQ"),
            Direction::Long,
            100,
            EntryType::Limit,
            dec!(100.0),
            dec!(99.0),
            dec!(101.5),
            ProductType::Intraday,
            "t",
            1,
            dec!(1000),
        )
        .unwrap();
        let mut trade = Trade::from_approved("t1", "2025-01-06", order, 0);
        trade.status = TradeStatus::Closed;
        trade.realized_pnl = Some(pnl);
        trade
    }

    #[test]
    fn test_profitable_long_credits_bullish_analysts() {
        let accuracy = score_analysts(&[candidate_with_signals()], &[closed_trade(dec!(150))]);
        assert_eq!(accuracy.len(), 2);

        let technical = accuracy.iter().find(|a| a.analyst_id == "technical").unwrap();
        assert_eq!((technical.signals_scored, technical.signals_correct), (1, 1));

        let derivatives = accuracy.iter().find(|a| a.analyst_id == "derivatives").unwrap();
        assert_eq!((derivatives.signals_scored, derivatives.signals_correct), (1, 0));
    }

    #[test]
    fn test_losing_long_credits_bearish_analysts() {
        let accuracy = score_analysts(&[candidate_with_signals()], &[closed_trade(dec!(-150))]);
        let technical = accuracy.iter().find(|a| a.analyst_id == "technical").unwrap();
        assert_eq!(technical.signals_correct, 0);
        let derivatives = accuracy.iter().find(|a| a.analyst_id == "derivatives").unwrap();
        assert_eq!(derivatives.signals_correct, 1);
    }

    #[test]
    fn test_open_trades_not_scored() {
        let mut trade = closed_trade(dec!(100));
        trade.status = TradeStatus::Open;
        let accuracy = score_analysts(&[candidate_with_signals()], &[trade]);
        assert!(accuracy.is_empty());
    }
}
