//! Configuration management for the insider-activity scanner system.

use serde::Deserialize;
use std::env;

use crate::types::TradeRole;
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub indexer: IndexerConfig,
    pub scoring: ScoringConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the embedded SQLite database file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "insider-scan.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Orderbook subgraph endpoint.
    pub subgraph_url: String,
    /// Data-API endpoint, the fallback plane for account history.
    pub data_api_url: String,
    /// Live trade stream endpoint.
    pub ws_url: String,
    /// Subgraph API key, read from `GOLDSKY_API_KEY`.
    pub api_key: Option<String>,
    pub subgraph_enabled: bool,
    /// Per-request timeout, seconds.
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Age at which cached coverage is considered stale, seconds.
    pub staleness_secs: i64,
    /// Wallets folded into one aliased subgraph query.
    pub batch_size: usize,
    /// Spacing between aliased query chunks, milliseconds.
    pub batch_delay_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            subgraph_url:
                "https://api.goldsky.com/api/public/project_cl6mb8i9h0003e201j6li0diw/subgraphs/polymarket-orderbook-resync/prod/gn"
                    .to_string(),
            data_api_url: "https://data-api.polymarket.com".to_string(),
            ws_url: "wss://ws-live-data.polymarket.com".to_string(),
            api_key: None,
            subgraph_enabled: true,
            request_timeout_secs: 30,
            max_retries: 3,
            staleness_secs: 300,
            batch_size: 50,
            batch_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Total score at or above which a trade becomes an alert.
    pub alert_threshold: u32,
    pub size_weight: u32,
    pub account_weight: u32,
    pub conviction_weight: u32,
    /// Trades below this USD value score zero on magnitude.
    pub min_trade_usd: f64,
    /// WHALE tag threshold, USD.
    pub whale_usd: f64,
    /// Drop trivially-high-expected-value trades from candidate selection.
    pub safe_bet_filter: bool,
    /// Price bound for the safe-bet filter (buys at or above, sells at or
    /// below its complement).
    pub safe_bet_price: f64,
    /// SNIPER tag window after market creation, seconds.
    pub sniper_window_secs: i64,
    /// EARLY_MOVER: trade among the first K on its market.
    pub early_mover_rank: usize,
    /// EARLY_MOVER: price at or beyond this distance from 0.5 counts as
    /// extreme.
    pub early_mover_price: f64,
    /// DUMPING: sells on outcomes priced at or below this.
    pub dumping_price: f64,
    /// Which fills of a wallet analysis covers by default.
    #[serde(default)]
    pub default_role: TradeRoleConfig,
}

/// Serde-friendly wrapper since [`TradeRole`] lives with the wire types.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeRoleConfig {
    Maker,
    Taker,
    #[default]
    Both,
}

impl From<TradeRoleConfig> for TradeRole {
    fn from(role: TradeRoleConfig) -> Self {
        match role {
            TradeRoleConfig::Maker => TradeRole::Maker,
            TradeRoleConfig::Taker => TradeRole::Taker,
            TradeRoleConfig::Both => TradeRole::Both,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 70,
            size_weight: 40,
            account_weight: 35,
            conviction_weight: 25,
            min_trade_usd: 500.0,
            whale_usd: 10_000.0,
            safe_bet_filter: true,
            safe_bet_price: 0.95,
            sniper_window_secs: 86_400,
            early_mover_rank: 10,
            early_mover_price: 0.40,
            dumping_price: 0.30,
            default_role: TradeRoleConfig::Both,
        }
    }
}

impl ScoringConfig {
    /// Quick-phase candidate threshold: relaxed relative to the alert
    /// threshold so borderline wallets still get a history fetch.
    pub fn candidate_threshold(&self) -> u32 {
        self.alert_threshold.saturating_sub(10).max(40)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Events below this USD value are dropped before scoring.
    pub min_trade_usd: f64,
    pub verbose: bool,
    /// Session cache TTL for account history, seconds.
    pub cache_ttl_secs: u64,
    /// A connection held this long resets the reconnect counter, seconds.
    pub stability_window_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
    /// Idle time before a backfill pass fires, seconds.
    pub idle_backfill_secs: u64,
    pub backfill_max_wallets: usize,
    /// Wall-time budget for one backfill pass, seconds.
    pub backfill_budget_secs: u64,
    /// Wallets always highlighted regardless of score.
    pub watchlist: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_trade_usd: 100.0,
            verbose: false,
            cache_ttl_secs: 300,
            stability_window_secs: 60,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_multiplier: 2.0,
            idle_backfill_secs: 30,
            backfill_max_wallets: 3,
            backfill_budget_secs: 10,
            watchlist: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            indexer: IndexerConfig::default(),
            scoring: ScoringConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, with defaults for
    /// everything except secrets.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(path) = env::var("DATABASE_PATH") {
            config.database.path = path;
        }
        config.indexer.api_key = env::var("GOLDSKY_API_KEY").ok();
        if let Ok(url) = env::var("SUBGRAPH_URL") {
            config.indexer.subgraph_url = url;
        }
        if let Ok(url) = env::var("DATA_API_URL") {
            config.indexer.data_api_url = url;
        }
        if let Ok(url) = env::var("LIVE_WS_URL") {
            config.indexer.ws_url = url;
        }
        if let Some(enabled) = parse_env("SUBGRAPH_ENABLED")? {
            config.indexer.subgraph_enabled = enabled;
        }
        if let Some(secs) = parse_env("INDEXER_TIMEOUT_SECS")? {
            config.indexer.request_timeout_secs = secs;
        }
        if let Some(retries) = parse_env("INDEXER_MAX_RETRIES")? {
            config.indexer.max_retries = retries;
        }

        if let Some(threshold) = parse_env("ALERT_THRESHOLD")? {
            config.scoring.alert_threshold = threshold;
        }
        if let Some(floor) = parse_env("MIN_TRADE_USD")? {
            config.scoring.min_trade_usd = floor;
        }
        if let Some(price) = parse_env("SAFE_BET_PRICE")? {
            config.scoring.safe_bet_price = price;
        }
        if let Some(enabled) = parse_env("SAFE_BET_FILTER")? {
            config.scoring.safe_bet_filter = enabled;
        }

        if let Some(min) = parse_env("MONITOR_MIN_TRADE_USD")? {
            config.monitor.min_trade_usd = min;
        }
        if let Ok(list) = env::var("WATCHLIST") {
            config.monitor.watchlist = list
                .split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(None),
    }
}
