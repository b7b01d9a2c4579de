//! Account-history resolution across the two indexer data planes, cache
//! first.

use std::collections::HashMap;

use chrono::Utc;
use polymarket_core::api::{DataApiClient, SubgraphClient};
use polymarket_core::db::Store;
use polymarket_core::types::{AccountHistory, DataSource, HistoryLookup};
use polymarket_core::Result;
use tracing::{debug, info, warn};

/// Volume at which a zero-trade subgraph aggregate is treated as stale and
/// re-counted from raw fills, micro-USD ($100).
const STALE_AGGREGATE_MIN_VOLUME: i64 = 100_000_000;

/// How each wallet in a batch was resolved, for observability.
#[derive(Debug, Default, Clone)]
pub struct SourceDistribution {
    pub cache: usize,
    pub subgraph: usize,
    pub subgraph_trades: usize,
    pub data_api: usize,
    pub missing: usize,
}

/// Result of a batched history fetch.
#[derive(Debug, Default)]
pub struct HistoryBatch {
    pub lookups: HashMap<String, HistoryLookup>,
    pub sources: SourceDistribution,
}

pub struct HistoryFetcher<'a> {
    store: &'a Store,
    /// Absent when the subgraph plane is disabled by configuration.
    subgraph: Option<&'a SubgraphClient>,
    data_api: &'a DataApiClient,
    cache_ttl_secs: i64,
}

impl<'a> HistoryFetcher<'a> {
    pub fn new(
        store: &'a Store,
        subgraph: Option<&'a SubgraphClient>,
        data_api: &'a DataApiClient,
        cache_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            subgraph,
            data_api,
            cache_ttl_secs,
        }
    }

    /// Resolve one wallet's history: store cache, then subgraph (with
    /// redemption-combined profit), then the data-API plane. A wallet
    /// neither plane knows is genuinely new.
    pub async fn fetch(&self, wallet: &str) -> Result<HistoryLookup> {
        if let Some(cached) = self.cached(wallet).await? {
            debug!(wallet, "account history served from store");
            return Ok(HistoryLookup::Found(cached));
        }

        if let Some(subgraph) = self.subgraph {
            match self.fetch_subgraph(subgraph, wallet).await {
                Ok(Some(history)) => {
                    self.store.save_account_summary(&history).await?;
                    return Ok(HistoryLookup::Found(history));
                }
                Ok(None) => {}
                Err(err) => warn!(wallet, error = %err, "subgraph history lookup failed"),
            }
        }

        match self.data_api.fetch_account(wallet).await {
            Ok(Some(history)) => {
                self.store.save_account_summary(&history).await?;
                Ok(HistoryLookup::Found(history))
            }
            Ok(None) => Ok(HistoryLookup::Missing),
            Err(err) => {
                warn!(wallet, error = %err, "data-api history lookup failed");
                Ok(HistoryLookup::Missing)
            }
        }
    }

    /// Resolve a batch of wallets: cached wallets first, the rest through
    /// aliased subgraph queries, data-API fallback for stragglers.
    pub async fn fetch_batch(&self, wallets: &[String]) -> Result<HistoryBatch> {
        let mut batch = HistoryBatch::default();
        let mut misses: Vec<String> = Vec::new();

        for wallet in wallets {
            let wallet = wallet.to_lowercase();
            if let Some(cached) = self.cached(&wallet).await? {
                batch.sources.cache += 1;
                batch.lookups.insert(wallet, HistoryLookup::Found(cached));
            } else {
                misses.push(wallet);
            }
        }

        if let (Some(subgraph), false) = (self.subgraph, misses.is_empty()) {
            match subgraph.fetch_accounts(&misses).await {
                Ok(histories) => {
                    for history in histories {
                        let history = self.refresh_stale_aggregate(subgraph, history).await;
                        self.store.save_account_summary(&history).await?;
                        match history.data_source {
                            DataSource::SubgraphTrades => batch.sources.subgraph_trades += 1,
                            _ => batch.sources.subgraph += 1,
                        }
                        batch
                            .lookups
                            .insert(history.wallet.clone(), HistoryLookup::Found(history));
                    }
                }
                Err(err) => warn!(error = %err, "batched subgraph lookup failed"),
            }
            misses.retain(|wallet| !batch.lookups.contains_key(wallet));
        }

        for wallet in misses {
            match self.data_api.fetch_account(&wallet).await {
                Ok(Some(history)) => {
                    self.store.save_account_summary(&history).await?;
                    batch.sources.data_api += 1;
                    batch.lookups.insert(wallet, HistoryLookup::Found(history));
                }
                Ok(None) => {
                    batch.sources.missing += 1;
                    batch.lookups.insert(wallet, HistoryLookup::Missing);
                }
                Err(err) => {
                    warn!(wallet = %wallet, error = %err, "data-api fallback failed");
                    batch.sources.missing += 1;
                    batch.lookups.insert(wallet, HistoryLookup::Missing);
                }
            }
        }

        info!(
            cache = batch.sources.cache,
            subgraph = batch.sources.subgraph,
            subgraph_trades = batch.sources.subgraph_trades,
            data_api = batch.sources.data_api,
            missing = batch.sources.missing,
            "resolved account histories"
        );
        Ok(batch)
    }

    async fn cached(&self, wallet: &str) -> Result<Option<AccountHistory>> {
        let Some(account) = self.store.get_account(wallet).await? else {
            return Ok(None);
        };
        let fresh = account
            .synced_at
            .is_some_and(|at| (Utc::now() - at).num_seconds() <= self.cache_ttl_secs);
        if !fresh || account.total_trades == 0 {
            return Ok(None);
        }
        self.store.get_cached_history(wallet).await
    }

    /// Subgraph plane: the account aggregate plus redemptions, fetched
    /// concurrently, folded into combined profit.
    async fn fetch_subgraph(
        &self,
        subgraph: &SubgraphClient,
        wallet: &str,
    ) -> Result<Option<AccountHistory>> {
        let (account, redemptions) = tokio::join!(
            subgraph.fetch_account(wallet),
            subgraph.fetch_redemptions(wallet)
        );

        let Some(mut history) = account? else {
            return Ok(None);
        };

        match redemptions {
            Ok(redemptions) => {
                history.redemption_payout = redemptions.iter().map(|r| r.payout).sum();
                self.store.save_redemptions(&redemptions).await?;
            }
            Err(err) => warn!(wallet, error = %err, "redemption lookup failed"),
        }

        Ok(Some(self.refresh_stale_aggregate(subgraph, history).await))
    }

    /// A zero-trade aggregate on a wallet with real volume means the
    /// indexer's rollup lags; count fills directly instead.
    async fn refresh_stale_aggregate(
        &self,
        subgraph: &SubgraphClient,
        mut history: AccountHistory,
    ) -> AccountHistory {
        if history.total_trades == 0 && history.total_volume >= STALE_AGGREGATE_MIN_VOLUME {
            match subgraph.fetch_wallet_fill_count(&history.wallet).await {
                Ok(count) if count > 0 => {
                    debug!(
                        wallet = %history.wallet,
                        count, "re-counted trades for stale aggregate"
                    );
                    history.total_trades = count;
                    history.data_source = DataSource::SubgraphTrades;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(wallet = %history.wallet, error = %err, "trade re-count failed")
                }
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::config::IndexerConfig;
    use polymarket_core::types::Account;

    fn history(wallet: &str, total_trades: i64) -> AccountHistory {
        AccountHistory {
            wallet: wallet.into(),
            created_at: Some(1_700_000_000),
            first_trade_at: Some(1_700_000_000),
            last_trade_at: Some(1_700_500_000),
            total_trades,
            total_volume: 4_000_000_000,
            total_profit: 250_000_000,
            redemption_payout: 0,
            data_source: DataSource::Subgraph,
        }
    }

    #[tokio::test]
    async fn test_cached_serves_fresh_summary() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_account_summary(&history("0xW", 9)).await.unwrap();

        let data_api = DataApiClient::new(&IndexerConfig::default());
        let fetcher = HistoryFetcher::new(&store, None, &data_api, 300);

        let cached = fetcher.cached("0xw").await.unwrap().unwrap();
        assert_eq!(cached.total_trades, 9);
        assert_eq!(cached.data_source, DataSource::Cache);
    }

    #[tokio::test]
    async fn test_cached_expires_with_ttl() {
        let store = Store::open_in_memory().await.unwrap();
        // A row stamped an hour ago is a miss against a 5-minute TTL.
        store
            .save_account(&Account {
                wallet: "0xw".into(),
                created_at: Some(1_700_000_000),
                synced_from: None,
                synced_to: None,
                synced_at: Some(Utc::now() - chrono::Duration::seconds(3_600)),
                has_full_history: false,
                total_trades: 9,
                total_volume: 4_000_000_000,
                total_profit: 0,
            })
            .await
            .unwrap();

        let data_api = DataApiClient::new(&IndexerConfig::default());
        let fetcher = HistoryFetcher::new(&store, None, &data_api, 300);
        assert!(fetcher.cached("0xw").await.unwrap().is_none());

        // A generous TTL accepts the same row.
        let patient = HistoryFetcher::new(&store, None, &data_api, 86_400);
        assert!(patient.cached("0xw").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cached_skips_zero_trade_rows() {
        let store = Store::open_in_memory().await.unwrap();
        // Zero trades in the cache could be a stale aggregate; force a
        // re-fetch rather than serving it.
        store.save_account_summary(&history("0xW", 0)).await.unwrap();

        let data_api = DataApiClient::new(&IndexerConfig::default());
        let fetcher = HistoryFetcher::new(&store, None, &data_api, 300);
        assert!(fetcher.cached("0xw").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_misses_unknown_wallet() {
        let store = Store::open_in_memory().await.unwrap();
        let data_api = DataApiClient::new(&IndexerConfig::default());
        let fetcher = HistoryFetcher::new(&store, None, &data_api, 300);
        assert!(fetcher.cached("0xnobody").await.unwrap().is_none());
    }
}
