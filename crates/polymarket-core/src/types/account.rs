//! Account summaries, redemptions, and point-in-time wallet state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted summary stats for a wallet, with sync watermarks.
///
/// Watermarks move monotonically: `synced_from` only earlier, `synced_to`
/// only later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub wallet: String,
    /// Account creation time (unix seconds), when known.
    pub created_at: Option<i64>,
    pub synced_from: Option<i64>,
    pub synced_to: Option<i64>,
    pub synced_at: Option<DateTime<Utc>>,
    pub has_full_history: bool,
    pub total_trades: i64,
    /// Lifetime traded volume, 6-dp micro-USD.
    pub total_volume: i64,
    /// Lifetime trading profit, 6-dp micro-USD. May be negative.
    pub total_profit: i64,
}

/// Payout from a resolved market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub wallet: String,
    pub condition_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// 6-dp micro-USD.
    pub payout: i64,
}

/// A wallet pending deeper history sync.
#[derive(Debug, Clone)]
pub struct BackfillEntry {
    pub wallet: String,
    pub priority: i64,
    pub queued_at: DateTime<Utc>,
}

/// Where an account summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    Cache,
    Subgraph,
    /// Trade-counting query issued when the subgraph aggregate looked stale.
    SubgraphTrades,
    DataApi,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Cache => "cache",
            DataSource::Subgraph => "subgraph",
            DataSource::SubgraphTrades => "subgraph-trades",
            DataSource::DataApi => "data-api",
        }
    }
}

/// Resolved lifetime summary for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHistory {
    pub wallet: String,
    /// Account creation time (unix seconds), when the indexer reports it.
    pub created_at: Option<i64>,
    pub first_trade_at: Option<i64>,
    pub last_trade_at: Option<i64>,
    pub total_trades: i64,
    /// 6-dp micro-USD.
    pub total_volume: i64,
    /// Trading profit, 6-dp micro-USD.
    pub total_profit: i64,
    /// Sum of redemption payouts, 6-dp micro-USD.
    pub redemption_payout: i64,
    pub data_source: DataSource,
}

impl AccountHistory {
    /// Trading profit plus redemption payouts, 6-dp micro-USD.
    pub fn combined_profit(&self) -> i64 {
        self.total_profit + self.redemption_payout
    }

    /// The account's origin instant for age scoring: creation time when
    /// known, first trade otherwise.
    pub fn origin(&self) -> Option<i64> {
        self.created_at.or(self.first_trade_at)
    }
}

/// Outcome of an account-history lookup.
///
/// Three states matter to scoring and must stay distinct: the lookup was
/// never attempted (quick-scoring phase), it was attempted and found
/// nothing (genuinely new wallet), or it found a record.
#[derive(Debug, Clone)]
pub enum HistoryLookup {
    /// Lookup skipped; signals emit a placeholder score.
    Skipped,
    /// Lookup attempted, no record exists. The wallet is brand new.
    Missing,
    Found(AccountHistory),
}

impl HistoryLookup {
    pub fn found(&self) -> Option<&AccountHistory> {
        match self {
            HistoryLookup::Found(h) => Some(h),
            _ => None,
        }
    }
}

/// A wallet's state derived from store fills strictly before a timestamp.
///
/// Scoring judges a wallet by what it was *before* making the trade under
/// evaluation, never by post-trade lifetime aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStateAt {
    pub wallet: String,
    /// The query timestamp; fills at exactly this instant are excluded.
    pub as_of: i64,
    pub trade_count: i64,
    /// Complementary-filtered traded volume, 6-dp micro-USD.
    pub volume: i64,
    /// Realized profit before `as_of`, 6-dp micro-USD. Stays zero unless a
    /// layer with market-resolution data fills it in.
    pub pnl: i64,
    /// Most recent fill strictly before `as_of`.
    pub last_trade_at: Option<i64>,
    /// Set when the store's watermarks do not cover the queried interval,
    /// or when missing market metadata prevented complementary filtering.
    pub approximate: bool,
}

impl WalletStateAt {
    /// Days since the wallet's previous trade, as of `at`. A wallet with no
    /// prior trade has dormancy zero, never negative.
    pub fn dormancy_days(&self, at: i64) -> f64 {
        match self.last_trade_at {
            Some(last) => ((at - last).max(0)) as f64 / 86_400.0,
            None => 0.0,
        }
    }
}
