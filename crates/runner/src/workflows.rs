//! The five workflow definitions.

use crate::analysts::{
    DerivativesAnalyst, FundamentalAnalyst, MarketIntelAnalyst, NewsAnalyst, RegimeAnalyst,
    RegimeThresholds, TechnicalAnalyst, Universe,
};
use crate::config::AppConfig;
use crate::stages::{
    AggregateCandidates, ComposeDayReport, ExecuteBatch, LoadApprovedOrders, LoadNewsContext,
    MergeDigest, MonitorTick, RegimeGate, RiskSizing,
};
use execution_engine::ExecutionEngine;
use position_monitor::PositionMonitor;
use scheduler::workflows;
use std::sync::Arc;
use workflow_core::{AgentStage, QuorumPolicy, Workflow};

/// The five built workflows, keyed by their scheduled names.
pub struct WorkflowSet {
    pub intraday: Workflow,
    pub execution: Workflow,
    pub monitoring: Workflow,
    pub news: Workflow,
    pub post_trade: Workflow,
}

impl WorkflowSet {
    /// Look a workflow up by its scheduled name.
    pub fn by_name(&self, name: &str) -> Option<&Workflow> {
        match name {
            workflows::INTRADAY_ANALYSIS => Some(&self.intraday),
            workflows::ORDER_EXECUTION => Some(&self.execution),
            workflows::POSITION_MONITORING => Some(&self.monitoring),
            workflows::NEWS_DIGEST => Some(&self.news),
            workflows::POST_TRADE_ANALYSIS => Some(&self.post_trade),
            _ => None,
        }
    }

    /// All scheduled workflow names.
    pub fn names() -> [&'static str; 5] {
        [
            workflows::INTRADAY_ANALYSIS,
            workflows::ORDER_EXECUTION,
            workflows::POSITION_MONITORING,
            workflows::NEWS_DIGEST,
            workflows::POST_TRADE_ANALYSIS,
        ]
    }
}

/// The default workflow input for a trading date.
pub fn default_input(workflow: &str, session_id: &str) -> String {
    match workflow {
        workflows::INTRADAY_ANALYSIS => format!(
            "Analyze the universe for {session_id}: classify the regime, collect \
             research signals, aggregate high-conviction candidates and size them \
             within risk limits."
        ),
        workflows::ORDER_EXECUTION => format!(
            "Execute the risk-validated orders for {session_id} with protective \
             brackets; prioritize high-confidence entries."
        ),
        workflows::POSITION_MONITORING => format!(
            "Monitor open positions for {session_id}: trail stops by ATR, harvest \
             winners, close invalidated trades, never breach the daily loss floor."
        ),
        workflows::NEWS_DIGEST => {
            format!("Summarize market news for {session_id} into the running digest.")
        }
        workflows::POST_TRADE_ANALYSIS => format!(
            "Evaluate {session_id}: P&L, hit rate, per-analyst accuracy and lessons."
        ),
        other => format!("Run {other} for {session_id}."),
    }
}

/// Build the five workflows over the shared components.
pub fn build_workflows(
    config: Arc<AppConfig>,
    engine: Arc<ExecutionEngine>,
    monitor: Arc<PositionMonitor>,
) -> WorkflowSet {
    let universe: Universe = Arc::new(config.universe.clone());
    let thresholds = RegimeThresholds {
        calm: config.vix_calm,
        elevated: config.vix_elevated,
        halt: config.vix_halt,
    };

    let intraday = Workflow::new(workflows::INTRADAY_ANALYSIS)
        .agent(AgentStage::new(
            "Regime Check",
            Arc::new(RegimeAnalyst {
                vix_symbol: config.vix_symbol.clone(),
                thresholds,
            }),
        ))
        .function_stage("Regime Gate", Arc::new(RegimeGate))
        .parallel(
            "Research Council",
            vec![
                AgentStage::new(
                    "technical",
                    Arc::new(TechnicalAnalyst {
                        universe: universe.clone(),
                    }),
                ),
                AgentStage::new(
                    "fundamental",
                    Arc::new(FundamentalAnalyst {
                        universe: universe.clone(),
                    }),
                ),
                AgentStage::new(
                    "market-intel",
                    Arc::new(MarketIntelAnalyst {
                        universe: universe.clone(),
                    }),
                ),
                AgentStage::new(
                    "derivatives",
                    Arc::new(DerivativesAnalyst {
                        universe: universe.clone(),
                    }),
                ),
            ],
            // The council survives losing up to two specialist desks.
            QuorumPolicy::AtLeast(2),
        )
        .function_stage(
            "Aggregate Candidates",
            Arc::new(AggregateCandidates {
                config: config.clone(),
            }),
        )
        .function_stage(
            "Risk Sizing",
            Arc::new(RiskSizing {
                config: config.clone(),
            }),
        );

    let execution = Workflow::new(workflows::ORDER_EXECUTION)
        .function_stage("Load Approved Orders", Arc::new(LoadApprovedOrders))
        .function_stage(
            "Execute Batch",
            Arc::new(ExecuteBatch {
                engine: engine.clone(),
            }),
        );

    let monitoring = Workflow::new(workflows::POSITION_MONITORING)
        .function_stage("Load News Context", Arc::new(LoadNewsContext))
        .function_stage(
            "Monitor Tick",
            Arc::new(MonitorTick {
                monitor: monitor.clone(),
                engine: engine.clone(),
                venue_offset: config.venue_offset,
            }),
        );

    let news = Workflow::new(workflows::NEWS_DIGEST)
        .agent(AgentStage::new("News Analyst", Arc::new(NewsAnalyst)))
        .function_stage("Merge Digest", Arc::new(MergeDigest));

    let post_trade = Workflow::new(workflows::POST_TRADE_ANALYSIS).function_stage(
        "Compose Day Report",
        Arc::new(ComposeDayReport {
            engine,
            history_depth: 5,
        }),
    );

    WorkflowSet {
        intraday,
        execution,
        monitoring,
        news,
        post_trade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper;
    use broker_sim::SimBroker;
    use execution_engine::{ExecutionConfig, NoAuthRecovery};
    use market_data::StaticMarketData;
    use model::{state_keys, Artifact};
    use position_monitor::MonitorConfig;
    use rust_decimal_macros::dec;
    use session_store::{RunStatus, SessionStore};
    use std::time::Duration;
    use trade_ledger::TradeLedger;
    use workflow_core::{Ports, WorkflowRuntime};

    struct Fixture {
        runtime: WorkflowRuntime,
        set: WorkflowSet,
        sim: Arc<SimBroker>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(AppConfig::from_env());
        let sim = Arc::new(SimBroker::with_defaults());
        let market = Arc::new(StaticMarketData::new());
        paper::seed_broker(&sim, &config, chrono::Utc::now().timestamp_millis());
        paper::seed_market_data(&market, &config);

        let ledger = Arc::new(TradeLedger::in_memory());
        let engine = Arc::new(ExecutionEngine::new(
            sim.clone(),
            ledger.clone(),
            ExecutionConfig {
                fill_wait: Duration::from_millis(50),
                poll_interval: Duration::from_millis(10),
                ..ExecutionConfig::default()
            },
            Arc::new(NoAuthRecovery),
        ));
        let monitor = Arc::new(PositionMonitor::new(
            sim.clone(),
            ledger,
            MonitorConfig::default(),
        ));

        let store = Arc::new(SessionStore::new(dir.path()));
        let ports = Ports {
            broker: sim.clone(),
            market,
        };
        let runtime = WorkflowRuntime::new(store, ports);
        let set = build_workflows(config, engine, monitor);
        Fixture {
            runtime,
            set,
            sim,
            _dir: dir,
        }
    }

    async fn run(fixture: &Fixture, workflow: &Workflow, date: &str) -> session_store::RunStatus {
        fixture
            .runtime
            .run(
                workflow,
                date,
                &default_input(&workflow.name, date),
                WorkflowRuntime::never_cancelled(),
            )
            .await
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_calm_day_pipeline_produces_trades() {
        let fixture = fixture();

        let status = run(&fixture, &fixture.set.intraday, "2025-01-06").await;
        assert_eq!(status, RunStatus::Ok);

        let analysis = fixture
            .runtime
            .store()
            .session_state(workflows::INTRADAY_ANALYSIS, "2025-01-06")
            .unwrap();
        let approved = analysis
            .get(state_keys::APPROVED_ORDERS)
            .and_then(Artifact::as_approved_orders)
            .unwrap();
        assert!(
            !approved.is_empty(),
            "calm seeded market should size at least one order"
        );

        let status = run(&fixture, &fixture.set.execution, "2025-01-06").await;
        assert_eq!(status, RunStatus::Ok);

        let execution = fixture
            .runtime
            .store()
            .session_state(workflows::ORDER_EXECUTION, "2025-01-06")
            .unwrap();
        let summary = match execution.get(state_keys::EXECUTION) {
            Some(Artifact::Json(value)) => value.clone(),
            other => panic!("expected execution summary, got {other:?}"),
        };
        let results = summary["results"].as_array().unwrap();
        assert_eq!(results.len(), approved.len());
    }

    #[tokio::test]
    async fn test_halt_path_gates_and_execution_stays_ok() {
        let fixture = fixture();
        // VIX at 35: the regime analyst reads HALT.
        fixture
            .sim
            .set_price(&model::Symbol::new("NSE:INDIAVIX-INDEX"), dec!(35));

        let status = run(&fixture, &fixture.set.intraday, "2025-01-06").await;
        assert_eq!(status, RunStatus::Halted);

        let analysis = fixture
            .runtime
            .store()
            .session_state(workflows::INTRADAY_ANALYSIS, "2025-01-06")
            .unwrap();
        // The gate recorded empty sets before the research council ran.
        assert_eq!(
            analysis
                .get(state_keys::CANDIDATES)
                .and_then(Artifact::as_candidates)
                .map(<[model::Candidate]>::len),
            Some(0)
        );
        let session = fixture
            .runtime
            .store()
            .get_session(workflows::INTRADAY_ANALYSIS, "2025-01-06")
            .unwrap()
            .unwrap();
        let steps: Vec<&str> = session.runs[0]
            .step_outputs
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert!(!steps.contains(&"Research Council"));

        // The executor reads the empty set and completes OK with zero
        // trades.
        let status = run(&fixture, &fixture.set.execution, "2025-01-06").await;
        assert_eq!(status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn test_news_digest_merges_additively() {
        let fixture = fixture();

        run(&fixture, &fixture.set.news, "2025-01-06").await;
        let first = fixture
            .runtime
            .store()
            .session_state(workflows::NEWS_DIGEST, "2025-01-06")
            .unwrap();
        let first_digest = first
            .get(state_keys::NEWS_DIGEST)
            .and_then(Artifact::as_news_digest)
            .unwrap()
            .clone();

        // A second hourly run must keep every fact from the first.
        run(&fixture, &fixture.set.news, "2025-01-06").await;
        let second = fixture
            .runtime
            .store()
            .session_state(workflows::NEWS_DIGEST, "2025-01-06")
            .unwrap();
        let second_digest = second
            .get(state_keys::NEWS_DIGEST)
            .and_then(Artifact::as_news_digest)
            .unwrap();
        for event in &first_digest.key_events {
            assert!(second_digest.key_events.contains(event));
        }
    }

    #[tokio::test]
    async fn test_post_trade_sees_prior_analysis_days() {
        let fixture = fixture();

        for day in ["2025-01-06", "2025-01-07", "2025-01-08"] {
            let status = run(&fixture, &fixture.set.intraday, day).await;
            assert_eq!(status, RunStatus::Ok);
        }

        let status = run(&fixture, &fixture.set.post_trade, "2025-01-08").await;
        assert_eq!(status, RunStatus::Ok);

        let state = fixture
            .runtime
            .store()
            .session_state(workflows::POST_TRADE_ANALYSIS, "2025-01-08")
            .unwrap();
        let report = match state.get(state_keys::DAY_REPORT) {
            Some(Artifact::DayReport(report)) => report.clone(),
            other => panic!("expected day report, got {other:?}"),
        };
        assert_eq!(report.date, "2025-01-08");
        // The lessons acknowledge the prior runs it compared against.
        assert!(report
            .lessons
            .iter()
            .any(|l| l.contains("prior analysis runs")));
    }

    #[tokio::test]
    async fn test_monitoring_run_with_no_positions_is_ok() {
        let fixture = fixture();
        let status = run(&fixture, &fixture.set.monitoring, "2025-01-06").await;
        assert_eq!(status, RunStatus::Ok);
    }
}
