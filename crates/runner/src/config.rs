//! Application configuration from the environment.

use chrono::FixedOffset;
use common::{env_flag, env_or_default, env_parse};
use execution_engine::RiskLimits;
use model::Symbol;
use position_monitor::MonitorConfig;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Orchestrator settings. Defaults mirror the production deployment:
/// NSE large caps, IST, ₹100k capital, 1% per-trade risk, 2% daily floor.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Data directory for sessions, trades and token material.
    pub data_dir: PathBuf,
    /// Trade against the simulated broker instead of the live API.
    pub paper_trading: bool,
    /// Live API base URL.
    pub api_base_url: String,
    /// Application id for the auth header.
    pub app_id: String,
    /// SHA-256 of `app_id:secret` for the refresh flow.
    pub app_id_hash: String,
    /// Refresh PIN, when the operator configured one.
    pub refresh_pin: Option<String>,
    /// Venue-local UTC offset.
    pub venue_offset: FixedOffset,
    /// Trading universe.
    pub universe: Vec<Symbol>,
    /// Index symbol used for trend context.
    pub index_symbol: Symbol,
    /// Volatility index symbol used by the regime analyst.
    pub vix_symbol: Symbol,
    /// Risk figures.
    pub risk: RiskLimits,
    /// Monitor thresholds.
    pub monitor: MonitorConfig,
    /// VIX thresholds for regime classification.
    pub vix_calm: Decimal,
    pub vix_elevated: Decimal,
    pub vix_halt: Decimal,
    /// Minimum absolute composite score for a candidate.
    pub min_composite_score: Decimal,
    /// Minimum number of analysts agreeing on direction.
    pub min_agreeing_analysts: usize,
    /// Stop distance as a fraction of entry for generated candidates.
    pub stop_pct: Decimal,
    /// Reward-to-risk multiple for the generated target.
    pub reward_risk: Decimal,
}

impl AppConfig {
    /// Load from the environment (after `dotenvy` has run).
    pub fn from_env() -> Self {
        let capital: Decimal = env_parse("BASE_CAPITAL", Decimal::from(100_000));
        let per_trade_pct: Decimal = env_parse("MAX_RISK_PER_TRADE_PERCENT", Decimal::ONE);
        let daily_loss_pct: Decimal = env_parse("MAX_DAILY_LOSS_PERCENT", Decimal::TWO);
        let hundred = Decimal::ONE_HUNDRED;

        let risk = RiskLimits {
            capital,
            per_trade_risk: capital * per_trade_pct / hundred,
            daily_loss_floor: capital * daily_loss_pct / hundred,
            max_positions: env_parse("MAX_STOCKS_PER_DAY", 15usize),
            max_per_sector: env_parse("MAX_STOCKS_PER_SECTOR", 3usize),
            target_move: env_parse("TARGET_MOVE_PERCENT", Decimal::ONE) / hundred,
        };

        let monitor = MonitorConfig {
            daily_loss_floor: risk.daily_loss_floor,
            ..MonitorConfig::default()
        };

        let universe = env_or_default("TRADING_UNIVERSE", DEFAULT_UNIVERSE)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Symbol::new)
            .collect();

        Self {
            data_dir: PathBuf::from(env_or_default("DATA_DIR", ".orchestrator")),
            paper_trading: env_flag("PAPER_TRADE", true),
            api_base_url: env_or_default("BROKER_API_URL", "https://api.fyers.in"),
            app_id: env_or_default("BROKER_APP_ID", ""),
            app_id_hash: env_or_default("BROKER_APP_ID_HASH", ""),
            refresh_pin: std::env::var("BROKER_REFRESH_PIN").ok().filter(|s| !s.is_empty()),
            venue_offset: FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap(),
            universe,
            index_symbol: Symbol::new(env_or_default("INDEX_SYMBOL", "NSE:NIFTY50-INDEX")),
            vix_symbol: Symbol::new(env_or_default("VIX_SYMBOL", "NSE:INDIAVIX-INDEX")),
            risk,
            monitor,
            vix_calm: env_parse("VIX_CALM", Decimal::from(13)),
            vix_elevated: env_parse("VIX_ELEVATED", Decimal::from(20)),
            vix_halt: env_parse("VIX_HALT", Decimal::from(30)),
            min_composite_score: env_parse("MIN_COMPOSITE_SCORE", Decimal::from(6)),
            min_agreeing_analysts: env_parse("MIN_AGREEING_ANALYSTS", 2usize),
            stop_pct: env_parse("STOP_PERCENT", Decimal::ONE) / hundred,
            reward_risk: env_parse("REWARD_RISK", Decimal::new(15, 1)),
        }
    }

    /// Token file location.
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join("broker_token.json")
    }

    /// Trade ledger location.
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("trades.json")
    }
}

/// A compact slice of the NIFTY universe as the out-of-the-box default;
/// deployments override via `TRADING_UNIVERSE`.
const DEFAULT_UNIVERSE: &str = "NSE:RELIANCE-EQ,NSE:TCS-EQ,NSE:HDFCBANK-EQ,NSE:INFY-EQ,\
NSE:ICICIBANK-EQ,NSE:SBIN-EQ,NSE:BHARTIARTL-EQ,NSE:ITC-EQ,NSE:LT-EQ,NSE:AXISBANK-EQ,\
NSE:KOTAKBANK-EQ,NSE:HINDUNILVR-EQ,NSE:TATAMOTORS-EQ,NSE:MARUTI-EQ,NSE:SUNPHARMA-EQ,\
NSE:TITAN-EQ,NSE:ONGC-EQ,NSE:NTPC-EQ,NSE:POWERGRID-EQ,NSE:WIPRO-EQ";

/// Sector bucket for a universe symbol; unknown symbols have no sector.
pub fn sector_of(symbol: &Symbol) -> Option<String> {
    let name = symbol.as_str();
    let sector = if ["HDFCBANK", "ICICIBANK", "SBIN", "AXISBANK", "KOTAKBANK"]
        .iter()
        .any(|s| name.contains(s))
    {
        "BANKS"
    } else if ["TCS", "INFY", "WIPRO"].iter().any(|s| name.contains(s)) {
        "IT"
    } else if ["RELIANCE", "ONGC", "NTPC", "POWERGRID"]
        .iter()
        .any(|s| name.contains(s))
    {
        "ENERGY"
    } else if ["HINDUNILVR", "ITC", "TITAN"].iter().any(|s| name.contains(s)) {
        "CONSUMER"
    } else if ["TATAMOTORS", "MARUTI"].iter().any(|s| name.contains(s)) {
        "AUTO"
    } else if name.contains("SUNPHARMA") {
        "PHARMA"
    } else {
        return None;
    };
    Some(sector.to_string())
}

/// Lot size for a symbol (cash equities trade in single shares).
pub fn lot_size_of(_symbol: &Symbol) -> u32 {
    1
}
