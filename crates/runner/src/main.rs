//! Trading orchestrator entry point.
//!
//! ```bash
//! # Validate the broker token (exit 0 valid, 2 interactive step needed)
//! trading-orchestrator login
//!
//! # One-shot manual run of a workflow
//! trading-orchestrator run-workflow intraday-analysis --session 2025-01-06
//!
//! # Dump a session as JSON
//! trading-orchestrator show-session intraday-analysis 2025-01-06
//!
//! # Run the scheduler daemon
//! trading-orchestrator schedule
//! ```
//!
//! Paper mode (`PAPER_TRADE=1`, the default) trades against the in-process
//! simulated broker; live mode requires broker credentials in the
//! environment.

use async_trait::async_trait;
use auth::{FileTokenStore, TokenManager, TokenManagerConfig, TokenStatus};
use broker_core::{Broker, SharedBroker};
use broker_rest::{RestAuthFlow, RestBroker, RestBrokerConfig, TokenSource};
use broker_sim::SimBroker;
use common::{Clock, SystemClock};
use execution_engine::{AuthRecovery, ExecutionConfig, ExecutionEngine, NoAuthRecovery};
use market_data::StaticMarketData;
use metrics::create_metrics;
use position_monitor::PositionMonitor;
use runner::{build_workflows, paper, read_model, AppConfig, RunDispatcher, WorkflowSet};
use scheduler::{default_triggers, Scheduler, SchedulerConfig, WeekdayCalendar};
use session_store::{RunStatus, SessionStore};
use std::sync::Arc;
use tokio::sync::watch;
use trade_ledger::TradeLedger;
use tracing::{error, info, warn};
use workflow_core::{Ports, WorkflowRuntime};

fn print_usage() {
    eprintln!("Usage: trading-orchestrator <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login                                  Run the token ladder");
    eprintln!("  run-workflow <name> [--session <date>] One-shot manual run");
    eprintln!("  show-session <workflow> <date>         Emit a session as JSON");
    eprintln!("  schedule                               Run the scheduler daemon");
    eprintln!();
    eprintln!("Workflows:");
    for name in WorkflowSet::names() {
        eprintln!("  {name}");
    }
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PAPER_TRADE        1 (default) for the simulated broker, 0 for live");
    eprintln!("  DATA_DIR           State directory (default .orchestrator)");
    eprintln!("  BROKER_APP_ID      Live API application id");
    eprintln!("  BROKER_API_URL     Live API base URL");
    eprintln!("  TRADING_UNIVERSE   Comma-separated symbol list");
}

/// Supplies the REST adapter with the managed access token.
struct ManagedTokenSource(Arc<TokenManager>);

#[async_trait]
impl TokenSource for ManagedTokenSource {
    async fn access_token(&self) -> Option<String> {
        self.0.access_token().await
    }
}

/// Lets the execution engine pause on AUTH_EXPIRED and resume after the
/// ladder restores a token.
struct ManagedRecovery(Arc<TokenManager>);

#[async_trait]
impl AuthRecovery for ManagedRecovery {
    async fn recover(&self) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        matches!(self.0.recover(now_ms).await, Ok(TokenStatus::Valid))
    }
}

struct App {
    config: Arc<AppConfig>,
    store: Arc<SessionStore>,
    broker: SharedBroker,
    engine: Arc<ExecutionEngine>,
    dispatcher: Arc<RunDispatcher>,
    token: Arc<TokenManager>,
    metrics: metrics::SharedMetrics,
}

fn bootstrap() -> Result<App, String> {
    let config = Arc::new(AppConfig::from_env());
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| format!("cannot create data dir: {e}"))?;

    let token_store = FileTokenStore::new(config.token_path());
    let token: Arc<TokenManager> = if config.paper_trading {
        Arc::new(TokenManager::new(
            token_store,
            Arc::new(paper::PaperAuthFlow),
            TokenManagerConfig::default(),
        ))
    } else {
        let flow = RestAuthFlow::new(
            &config.api_base_url,
            config.app_id.clone(),
            config.app_id_hash.clone(),
            config.refresh_pin.clone(),
        )
        .map_err(|e| format!("auth flow init failed: {e}"))?;
        Arc::new(TokenManager::new(
            token_store,
            Arc::new(flow),
            TokenManagerConfig::default(),
        ))
    };

    let market = Arc::new(StaticMarketData::new());
    let broker: SharedBroker = if config.paper_trading {
        let sim = Arc::new(SimBroker::with_defaults());
        paper::seed_broker(&sim, &config, chrono::Utc::now().timestamp_millis());
        paper::seed_market_data(&market, &config);
        sim
    } else {
        let rest = RestBroker::new(
            RestBrokerConfig {
                base_url: config.api_base_url.clone(),
                app_id: config.app_id.clone(),
                ..RestBrokerConfig::default()
            },
            Arc::new(ManagedTokenSource(token.clone())),
        )
        .map_err(|e| format!("broker init failed: {e}"))?;
        let rest = Arc::new(rest);
        rest.start_pollers();
        rest
    };

    let ledger = Arc::new(
        TradeLedger::open(config.ledger_path()).map_err(|e| format!("ledger open failed: {e}"))?,
    );

    let recovery: Arc<dyn AuthRecovery> = if config.paper_trading {
        Arc::new(NoAuthRecovery)
    } else {
        Arc::new(ManagedRecovery(token.clone()))
    };
    let engine = Arc::new(ExecutionEngine::new(
        broker.clone(),
        ledger.clone(),
        ExecutionConfig::default(),
        recovery,
    ));
    let monitor = Arc::new(PositionMonitor::new(
        broker.clone(),
        ledger.clone(),
        config.monitor.clone(),
    ));

    let store = Arc::new(SessionStore::new(&config.data_dir));
    let runtime = Arc::new(WorkflowRuntime::new(
        store.clone(),
        Ports {
            broker: broker.clone(),
            market,
        },
    ));
    let workflows = Arc::new(build_workflows(config.clone(), engine.clone(), monitor));
    let metrics = create_metrics();

    let token_gate = (!config.paper_trading).then(|| token.clone());
    let dispatcher = Arc::new(RunDispatcher::new(
        runtime.clone(),
        workflows.clone(),
        metrics.clone(),
        token_gate,
    ));

    Ok(App {
        config,
        store,
        broker,
        engine,
        dispatcher,
        token,
        metrics,
    })
}

async fn cmd_login(app: &App) -> i32 {
    let now_ms = chrono::Utc::now().timestamp_millis();

    if app.config.paper_trading {
        // Paper mode mints its own token so the rest of the stack behaves
        // identically.
        if let Err(e) = app.token.install(paper::paper_token(now_ms), now_ms).await {
            error!(error = %e, "paper token install failed");
            return 1;
        }
        println!("paper token installed");
        return 0;
    }

    match app.token.ensure_valid(now_ms).await {
        Ok(TokenStatus::Valid) => {
            println!("token valid");
            0
        }
        Ok(TokenStatus::NeedsInteractive) => {
            eprintln!("interactive re-authentication required:");
            eprintln!("  complete the broker login flow and save the token file at");
            eprintln!("  {}", app.config.token_path().display());
            2
        }
        Err(e) => {
            error!(error = %e, "token ladder failed");
            1
        }
    }
}

async fn cmd_run_workflow(app: &App, name: &str, session: Option<String>) -> i32 {
    let session_id = session.unwrap_or_else(|| {
        SystemClock
            .now_local(app.config.venue_offset)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    });

    match app.dispatcher.run_now(name, &session_id).await {
        Ok(outcome) => {
            println!(
                "run {} finished with status {:?}",
                outcome.run_id, outcome.status
            );
            if let Some(error) = &outcome.error {
                eprintln!("error: {error}");
            }
            match outcome.status {
                RunStatus::Ok | RunStatus::Partial => 0,
                RunStatus::Halted => 3,
                RunStatus::Failed => 1,
            }
        }
        Err(e) => {
            error!(error = %e, "run refused");
            1
        }
    }
}

fn cmd_show_session(app: &App, workflow: &str, date: &str) -> i32 {
    match read_model::session(&app.store, workflow, date) {
        Ok(Some(session)) => match serde_json::to_string_pretty(&session) {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                error!(error = %e, "session serialization failed");
                1
            }
        },
        Ok(None) => {
            eprintln!("no session for {workflow} on {date}");
            1
        }
        Err(e) => {
            error!(error = %e, "session store read failed");
            1
        }
    }
}

async fn cmd_schedule(app: &App) -> i32 {
    // Gate startup on a valid token exactly like every later dispatch.
    let login_code = cmd_login(app).await;
    if login_code != 0 {
        return login_code;
    }

    // Reconcile against broker truth before the first trigger; on a
    // restart the ledger may lag what actually filled.
    let today = SystemClock
        .now_local(app.config.venue_offset)
        .date_naive()
        .format("%Y-%m-%d")
        .to_string();
    match app.engine.reconcile(&today).await {
        Ok(corrections) if corrections > 0 => {
            warn!(corrections, "startup reconciliation corrected local trades")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "startup reconciliation failed"),
    }

    // Feed broker order updates through the engine for the life of the
    // process.
    {
        let mut updates = app.broker.subscribe_orders();
        let engine = app.engine.clone();
        tokio::spawn(async move {
            while let Ok(update) = updates.recv().await {
                if let Err(e) = engine.on_order_update(&update) {
                    warn!(error = %e, "order update reconciliation failed");
                }
            }
        });
    }

    let scheduler = Scheduler::new(
        Arc::new(SystemClock),
        Arc::new(WeekdayCalendar::with_holidays(paper::exchange_holidays())),
        default_triggers(),
        SchedulerConfig {
            venue_offset: app.config.venue_offset,
            ..SchedulerConfig::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat_metrics = app.metrics.clone();
    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let snap = heartbeat_metrics.snapshot();
            info!(
                uptime_secs = snap.uptime_secs,
                runs_ok = snap.runs_ok,
                runs_failed = snap.runs_failed,
                triggers_fired = snap.triggers_fired,
                triggers_dropped = snap.triggers_dropped,
                "heartbeat"
            );
        }
    });

    let scheduler_task = scheduler.run(app.dispatcher.as_ref(), shutdown_rx);
    tokio::select! {
        _ = scheduler_task => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    }
    heartbeat.abort();
    0
}

#[tokio::main]
async fn main() {
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("Loaded environment from: {}", path.display()),
        Err(dotenvy::Error::Io(_)) => {}
        Err(e) => eprintln!("Warning: failed to load .env file: {e}"),
    }
    common::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        std::process::exit(1);
    };

    let app = match bootstrap() {
        Ok(app) => app,
        Err(e) => {
            eprintln!("bootstrap failed: {e}");
            std::process::exit(1);
        }
    };

    let code = match command {
        "login" => cmd_login(&app).await,
        "run-workflow" => {
            let Some(name) = args.get(1) else {
                print_usage();
                std::process::exit(1);
            };
            let session = match args.get(2).map(String::as_str) {
                Some("--session") => args.get(3).cloned(),
                Some(other) => {
                    eprintln!("unknown option: {other}");
                    print_usage();
                    std::process::exit(1);
                }
                None => None,
            };
            cmd_run_workflow(&app, name, session).await
        }
        "show-session" => {
            let (Some(workflow), Some(date)) = (args.get(1), args.get(2)) else {
                print_usage();
                std::process::exit(1);
            };
            cmd_show_session(&app, workflow, date)
        }
        "schedule" => cmd_schedule(&app).await,
        "--help" | "-h" | "help" => {
            print_usage();
            0
        }
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            1
        }
    };

    std::process::exit(code);
}
