//! Streaming monitor: score live trade events as they arrive, backfill
//! wallet history when the stream goes quiet.

mod cache;
mod ws;

pub use cache::SessionCache;
pub use ws::{backoff_delay, ConnectionState, LiveTradeStream, StreamConfig};

use std::time::Duration;

use polymarket_core::api::{DataApiClient, SubgraphClient};
use polymarket_core::config::Config;
use polymarket_core::db::Store;
use polymarket_core::types::{fixed, HistoryLookup, Trade, TradeEvent};
use polymarket_core::Result;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analyze::Analyzer;
use crate::score::{evaluate_trade, ClassifyContext};

const SESSION_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Default, Clone)]
pub struct MonitorStats {
    pub events_received: usize,
    pub events_scored: usize,
    pub alerts: usize,
    pub backfilled_wallets: usize,
}

pub struct Monitor<'a> {
    store: &'a Store,
    subgraph: &'a SubgraphClient,
    data_api: &'a DataApiClient,
    config: &'a Config,
    cache: SessionCache,
    stats: MonitorStats,
}

impl<'a> Monitor<'a> {
    pub fn new(
        store: &'a Store,
        subgraph: &'a SubgraphClient,
        data_api: &'a DataApiClient,
        config: &'a Config,
    ) -> Self {
        let cache = SessionCache::new(
            Duration::from_secs(config.monitor.cache_ttl_secs),
            SESSION_CACHE_MAX_ENTRIES,
        );
        Self {
            store,
            subgraph,
            data_api,
            config,
            cache,
            stats: MonitorStats::default(),
        }
    }

    /// Run until `shutdown` resolves (e.g. ctrl-c). Events are processed
    /// in arrival order; a 30-second quiet period triggers one bounded
    /// backfill pass.
    pub async fn run(
        &mut self,
        markets: Vec<String>,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<MonitorStats> {
        let stream_config = StreamConfig::from_monitor(
            self.config.indexer.ws_url.clone(),
            markets,
            &self.config.monitor,
        );
        let (stream, mut events) = LiveTradeStream::spawn(stream_config);

        let idle = Duration::from_secs(self.config.monitor.idle_backfill_secs);
        let mut idle_deadline = Instant::now() + idle;
        tokio::pin!(shutdown);

        info!("monitor started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            idle_deadline = Instant::now() + idle;
                            self.stats.events_received += 1;
                            if let Err(err) = self.handle_event(event).await {
                                warn!(error = %err, "event scoring failed");
                            }
                        }
                        None => {
                            warn!("trade stream task exited");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(idle_deadline) => {
                    idle_deadline = Instant::now() + idle;
                    self.idle_backfill().await;
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        // In-flight lookups were awaited inline; releasing the stream is
        // all that is left before the caller closes the store.
        stream.shutdown();
        info!(
            events = self.stats.events_received,
            scored = self.stats.events_scored,
            alerts = self.stats.alerts,
            "monitor stopped"
        );
        Ok(self.stats.clone())
    }

    async fn handle_event(&mut self, event: TradeEvent) -> Result<()> {
        let value_usd = fixed::to_f64(event.value_usd());
        if value_usd < self.config.monitor.min_trade_usd {
            return Ok(());
        }

        let wallet = event.proxy_wallet.to_lowercase();
        let watchlisted = self.config.monitor.watchlist.contains(&wallet);

        let lookup = match self.cache.get(&wallet) {
            Some(lookup) => lookup,
            None => {
                let subgraph = self
                    .config
                    .indexer
                    .subgraph_enabled
                    .then_some(self.subgraph);
                let fetcher = crate::history::HistoryFetcher::new(
                    self.store,
                    subgraph,
                    self.data_api,
                    self.config.indexer.staleness_secs,
                );
                let lookup = fetcher.fetch(&wallet).await?;
                if matches!(lookup, HistoryLookup::Missing) {
                    // Unknown wallets are exactly the ones worth a deeper
                    // look when the stream goes idle.
                    self.store
                        .queue_backfill(&wallet, value_usd as i64)
                        .await?;
                }
                self.cache.insert(&wallet, lookup.clone());
                lookup
            }
        };

        let trade = trade_from_event(&event);
        let scored = evaluate_trade(
            &trade,
            &lookup,
            None,
            None,
            ClassifyContext::default(),
            &self.config.scoring,
        );
        self.stats.events_scored += 1;

        if scored.is_alert || watchlisted {
            self.stats.alerts += 1;
            info!(
                wallet = %wallet,
                market = %event.slug,
                side = trade.side.as_str(),
                outcome = trade.outcome.as_str(),
                value_usd,
                score = scored.total,
                watchlisted,
                "suspicious trade"
            );
        } else if self.config.monitor.verbose {
            info!(
                wallet = %wallet,
                market = %event.slug,
                value_usd,
                score = scored.total,
                "trade"
            );
        }

        Ok(())
    }

    async fn idle_backfill(&mut self) {
        let analyzer = Analyzer::new(self.store, self.subgraph, self.data_api, self.config);
        match analyzer
            .drain_backfill(
                self.config.monitor.backfill_max_wallets,
                Duration::from_secs(self.config.monitor.backfill_budget_secs),
            )
            .await
        {
            Ok(0) => debug!("idle backfill: queue empty"),
            Ok(drained) => {
                self.stats.backfilled_wallets += drained;
                info!(drained, "idle backfill pass complete");
            }
            Err(err) => warn!(error = %err, "idle backfill failed"),
        }
    }
}

/// A stream event is already the wallet's own perspective: side, outcome,
/// size, and price describe what the proxy wallet did.
fn trade_from_event(event: &TradeEvent) -> Trade {
    Trade {
        transaction_hash: event.transaction_hash.clone(),
        condition_id: event.condition_id.clone(),
        token_id: event.asset.clone(),
        wallet: event.proxy_wallet.to_lowercase(),
        side: event.side,
        outcome: event.outcome_side(),
        role: polymarket_core::types::FillRole::Taker,
        size: event.size,
        avg_price: event.price,
        value_usd: event.value_usd(),
        timestamp: event.timestamp,
        fills: Vec::new(),
        had_complementary_fills: false,
        complementary_value: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::types::{OutcomeSide, Side};

    #[test]
    fn test_trade_from_event_keeps_wallet_perspective() {
        let raw = r#"{
            "asset": "tok-1",
            "conditionId": "0xcond",
            "outcomeIndex": 1,
            "price": "0.25",
            "proxyWallet": "0xWALLET",
            "side": "SELL",
            "size": 400,
            "timestamp": 1700000000,
            "transactionHash": "0xtx"
        }"#;
        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        let trade = trade_from_event(&event);

        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.outcome, OutcomeSide::No);
        assert_eq!(trade.wallet, "0xwallet");
        // $0.25 * 400 shares
        assert_eq!(trade.value_usd, 100_000_000);
        assert_eq!(trade.avg_price, 250_000);
    }
}
