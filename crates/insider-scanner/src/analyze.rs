//! Batch market analysis: three phases that bound expensive per-wallet
//! lookups to the wallets that earn them.
//!
//! Phase 1 quick-scores every reconstructed trade without account data and
//! collects candidate wallets. Phase 2 fetches history for the candidates
//! in batched requests. Phase 3 re-scores with history and point-in-time
//! state, tags, and ranks.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use polymarket_core::api::{DataApiClient, SubgraphClient};
use polymarket_core::config::Config;
use polymarket_core::db::Store;
use polymarket_core::types::{
    HistoryLookup, MarketToken, OutcomeSide, Side, Trade, TradeRole,
};
use polymarket_core::Result;
use tracing::{debug, info, warn};

use crate::aggregator::{aggregate, AggregateInput};
use crate::fetcher::{FillFetcher, FillRequest};
use crate::history::{HistoryFetcher, SourceDistribution};
use crate::resolver::MarketResolver;
use crate::score::{evaluate_trade, ClassifyContext, TradeScore};
use crate::state::PointInTime;

/// What to analyze and how much to report.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    /// Token id of either outcome of the target market.
    pub token_id: String,
    pub after: Option<i64>,
    pub before: Option<i64>,
    /// Restrict reported trades to one outcome side.
    pub outcome: Option<OutcomeSide>,
    pub role: TradeRole,
    /// Cap on trades scanned in phase 1.
    pub max_trades: Option<usize>,
    pub top_n: usize,
}

#[derive(Debug)]
pub struct AnalyzeReport {
    /// Alerts, highest total first, at most `top_n`.
    pub alerts: Vec<TradeScore>,
    pub scanned_trades: usize,
    pub scanned_wallets: usize,
    pub candidate_wallets: usize,
    pub sources: SourceDistribution,
    /// Set when a fill delta fetch failed and analysis ran on cached
    /// coverage.
    pub degraded: bool,
}

/// Full per-trade breakdown for one wallet.
#[derive(Debug)]
pub struct WalletReport {
    pub wallet: String,
    pub history: HistoryLookup,
    /// Every reconstructed trade with its score, highest total first.
    pub trades: Vec<TradeScore>,
}

pub struct Analyzer<'a> {
    store: &'a Store,
    subgraph: &'a SubgraphClient,
    data_api: &'a DataApiClient,
    config: &'a Config,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        store: &'a Store,
        subgraph: &'a SubgraphClient,
        data_api: &'a DataApiClient,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            subgraph,
            data_api,
            config,
        }
    }

    fn history_fetcher(&self) -> HistoryFetcher<'a> {
        let subgraph = self
            .config
            .indexer
            .subgraph_enabled
            .then_some(self.subgraph);
        HistoryFetcher::new(
            self.store,
            subgraph,
            self.data_api,
            self.config.indexer.staleness_secs,
        )
    }

    /// Run the three-phase market scan.
    pub async fn analyze_market(&self, request: &AnalyzeRequest) -> Result<AnalyzeReport> {
        let started = Instant::now();
        let scoring = &self.config.scoring;

        // Resolve both outcome tokens of the condition so complementary
        // fills can be recognized.
        let resolver = MarketResolver::new(self.store, self.subgraph);
        let mut tokens = resolver.resolve_condition(&request.token_id).await?;
        if tokens.is_empty() {
            warn!(
                token_id = %request.token_id,
                "token resolution failed; treating the token as its own condition"
            );
            tokens = vec![MarketToken {
                token_id: request.token_id.clone(),
                condition_id: request.token_id.clone(),
                question: String::new(),
                outcome: String::new(),
                outcome_index: 0,
                created_at: None,
                resolved_at: None,
            }];
        }
        let token_map: HashMap<String, MarketToken> = tokens
            .iter()
            .cloned()
            .map(|t| (t.token_id.clone(), t))
            .collect();

        // Pull fills for every side of the condition through the cache.
        let fetcher = FillFetcher::new(self.store, self.subgraph, self.config.indexer.staleness_secs);
        let mut fills = Vec::new();
        let mut degraded = false;
        for token in &tokens {
            let response = fetcher
                .fetch(&FillRequest {
                    token_id: token.token_id.clone(),
                    after: request.after,
                    before: request.before,
                    limit: None,
                })
                .await?;
            degraded |= response.degraded;
            fills.extend(response.fills);
        }
        info!(
            fills = fills.len(),
            tokens = tokens.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collected market fills"
        );

        // Reconstruct per-wallet trades.
        let mut wallets: HashSet<String> = HashSet::new();
        for fill in &fills {
            match request.role {
                TradeRole::Maker => {
                    wallets.insert(fill.maker.clone());
                }
                TradeRole::Taker => {
                    wallets.insert(fill.taker.clone());
                }
                TradeRole::Both => {
                    wallets.insert(fill.maker.clone());
                    wallets.insert(fill.taker.clone());
                }
            }
        }

        let mut trades: Vec<Trade> = Vec::new();
        for wallet in &wallets {
            let wallet_fills: Vec<_> = fills
                .iter()
                .filter(|f| f.involves(wallet, request.role))
                .cloned()
                .collect();
            let aggregation = aggregate(&AggregateInput {
                wallet,
                fills: &wallet_fills,
                tokens: &token_map,
                positions: None,
            });
            trades.extend(aggregation.trades);
        }

        if let Some(outcome) = request.outcome {
            trades.retain(|t| t.outcome == outcome);
        }
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(max) = request.max_trades {
            trades.truncate(max);
        }

        // Oldest-first rank per trade, for the early-mover tag.
        let ranks = market_ranks(&trades);

        // Phase 1: quick score, no account data.
        let quick_started = Instant::now();
        let mut candidates: HashSet<String> = HashSet::new();
        let candidate_threshold = scoring.candidate_threshold();
        for trade in &trades {
            if self.is_filtered_safe_bet(trade, &token_map) {
                continue;
            }
            let quick = evaluate_trade(
                trade,
                &HistoryLookup::Skipped,
                None,
                None,
                ClassifyContext::default(),
                scoring,
            );
            if quick.total >= candidate_threshold {
                candidates.insert(trade.wallet.clone());
            }
        }
        info!(
            trades = trades.len(),
            wallets = wallets.len(),
            candidates = candidates.len(),
            elapsed_ms = quick_started.elapsed().as_millis() as u64,
            "quick-score phase complete"
        );

        // Phase 2: batched history for the candidates only.
        let candidate_list: Vec<String> = candidates.iter().cloned().collect();
        let history = self.history_fetcher();
        let batch = history.fetch_batch(&candidate_list).await?;

        // Phase 3: final score with history and point-in-time state.
        let point_in_time = PointInTime::new(self.store);
        let mut alerts: Vec<TradeScore> = Vec::new();
        for trade in &trades {
            if !candidates.contains(&trade.wallet) {
                continue;
            }
            if self.is_filtered_safe_bet(trade, &token_map) {
                continue;
            }
            let lookup = batch
                .lookups
                .get(&trade.wallet)
                .cloned()
                .unwrap_or(HistoryLookup::Missing);
            let state = point_in_time
                .account_state_at(&trade.wallet, trade.timestamp)
                .await?;
            let classify = ClassifyContext {
                market_created_at: token_map
                    .get(&trade.token_id)
                    .and_then(|t| t.created_at),
                market_rank: ranks.get(&trade.transaction_hash).copied(),
                has_position: held_before(&trades, trade),
            };
            let scored = evaluate_trade(trade, &lookup, Some(&state), None, classify, scoring);
            if scored.is_alert {
                alerts.push(scored);
            }
        }
        alerts.sort_by(|a, b| b.total.cmp(&a.total));
        alerts.truncate(request.top_n);

        // Candidates whose deep history the store still lacks get queued
        // for idle backfill.
        for wallet in &candidate_list {
            let complete = self
                .store
                .get_account(wallet)
                .await?
                .map(|a| a.has_full_history)
                .unwrap_or(false);
            if !complete && !self.store.has_queued_backfill(wallet).await? {
                self.store.queue_backfill(wallet, 1).await?;
            }
        }
        self.drain_backfill(
            self.config.monitor.backfill_max_wallets,
            Duration::from_secs(self.config.monitor.backfill_budget_secs),
        )
        .await?;

        info!(
            alerts = alerts.len(),
            degraded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );
        Ok(AnalyzeReport {
            alerts,
            scanned_trades: trades.len(),
            scanned_wallets: wallets.len(),
            candidate_wallets: candidates.len(),
            sources: batch.sources,
            degraded,
        })
    }

    /// Single-wallet deep dive: no candidate filter, no safe-bet filter,
    /// every trade reported with its full breakdown.
    pub async fn investigate_wallet(&self, wallet: &str) -> Result<WalletReport> {
        let wallet = wallet.to_lowercase();
        let fills = self
            .store
            .get_fills_for_wallet(&wallet, Default::default())
            .await?;

        let mut token_ids: Vec<String> = fills.iter().map(|f| f.token_id.clone()).collect();
        token_ids.sort();
        token_ids.dedup();
        let resolver = MarketResolver::new(self.store, self.subgraph);
        let token_map = resolver.resolve(&token_ids).await?;

        let positions = match self.subgraph.fetch_positions(&wallet).await {
            Ok(positions) => positions,
            Err(err) => {
                warn!(wallet = %wallet, error = %err, "position lookup failed");
                Vec::new()
            }
        };

        let aggregation = aggregate(&AggregateInput {
            wallet: &wallet,
            fills: &fills,
            tokens: &token_map,
            positions: Some(&positions),
        });

        let history = self.history_fetcher().fetch(&wallet).await?;
        let point_in_time = PointInTime::new(self.store);

        let mut trades = Vec::with_capacity(aggregation.trades.len());
        for trade in &aggregation.trades {
            let state = point_in_time
                .account_state_at(&wallet, trade.timestamp)
                .await?;
            let classify = ClassifyContext {
                market_created_at: token_map
                    .get(&trade.token_id)
                    .and_then(|t| t.created_at),
                market_rank: None,
                has_position: positions
                    .iter()
                    .any(|p| p.token_id == trade.token_id && p.net_quantity != 0),
            };
            trades.push(evaluate_trade(
                trade,
                &history,
                Some(&state),
                None,
                classify,
                &self.config.scoring,
            ));
        }
        trades.sort_by(|a, b| b.total.cmp(&a.total));

        Ok(WalletReport {
            wallet,
            history,
            trades,
        })
    }

    /// Drain up to `max_wallets` backfill entries within `budget`.
    pub async fn drain_backfill(&self, max_wallets: usize, budget: Duration) -> Result<usize> {
        let started = Instant::now();
        let entries = self.store.get_backfill_queue(Some(max_wallets as i64)).await?;
        let mut drained = 0;

        for entry in entries {
            if started.elapsed() >= budget {
                debug!(drained, "backfill budget exhausted");
                break;
            }
            match self.history_fetcher().fetch(&entry.wallet).await {
                Ok(HistoryLookup::Found(history)) => {
                    if let Some(last) = history.last_trade_at {
                        self.store.update_account_synced_to(&entry.wallet, last).await?;
                    }
                    self.store.mark_account_complete(&entry.wallet).await?;
                    self.store.mark_backfill_complete(&entry.wallet).await?;
                    drained += 1;
                }
                Ok(_) => {
                    // Nothing to backfill for an unknown wallet.
                    self.store.mark_backfill_complete(&entry.wallet).await?;
                    drained += 1;
                }
                Err(err) => {
                    warn!(wallet = %entry.wallet, error = %err, "backfill fetch failed");
                }
            }
        }

        Ok(drained)
    }

    fn is_filtered_safe_bet(
        &self,
        trade: &Trade,
        tokens: &HashMap<String, MarketToken>,
    ) -> bool {
        let scoring = &self.config.scoring;
        if !scoring.safe_bet_filter {
            return false;
        }
        let resolved = tokens
            .get(&trade.token_id)
            .map(|t| t.is_resolved())
            .unwrap_or(false);
        resolved && trade.is_safe_bet(scoring.safe_bet_price)
    }
}

/// Rank each transaction by its earliest trade timestamp, oldest first.
fn market_ranks(trades: &[Trade]) -> HashMap<String, usize> {
    let mut ordered: Vec<(&String, i64)> = trades
        .iter()
        .map(|t| (&t.transaction_hash, t.timestamp))
        .collect();
    ordered.sort_by_key(|(_, ts)| *ts);
    ordered
        .into_iter()
        .enumerate()
        .map(|(rank, (tx, _))| (tx.clone(), rank))
        .collect()
}

/// Whether the wallet bought this token in an earlier reconstructed trade:
/// the sell of an existing position, as far as the scanned window shows.
fn held_before(trades: &[Trade], trade: &Trade) -> bool {
    trades.iter().any(|t| {
        t.wallet == trade.wallet
            && t.token_id == trade.token_id
            && t.side == Side::Buy
            && t.timestamp < trade.timestamp
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::types::FillRole;

    fn trade(tx: &str, wallet: &str, token: &str, side: Side, ts: i64) -> Trade {
        Trade {
            transaction_hash: tx.into(),
            condition_id: "cond".into(),
            token_id: token.into(),
            wallet: wallet.into(),
            side,
            outcome: OutcomeSide::Yes,
            role: FillRole::Taker,
            size: 1_000_000,
            avg_price: 500_000,
            value_usd: 500_000,
            timestamp: ts,
            fills: Vec::new(),
            had_complementary_fills: false,
            complementary_value: 0,
        }
    }

    #[test]
    fn test_market_ranks_are_oldest_first() {
        let trades = vec![
            trade("0xc", "0xw1", "tok", Side::Buy, 300),
            trade("0xa", "0xw2", "tok", Side::Buy, 100),
            trade("0xb", "0xw3", "tok", Side::Buy, 200),
        ];
        let ranks = market_ranks(&trades);
        assert_eq!(ranks["0xa"], 0);
        assert_eq!(ranks["0xb"], 1);
        assert_eq!(ranks["0xc"], 2);
    }

    #[test]
    fn test_held_before_requires_prior_buy_on_same_token() {
        let buy = trade("0xa", "0xw", "tok", Side::Buy, 100);
        let sell = trade("0xb", "0xw", "tok", Side::Sell, 200);
        let other_token_sell = trade("0xc", "0xw", "tok2", Side::Sell, 300);
        let trades = vec![buy.clone(), sell.clone(), other_token_sell.clone()];

        assert!(held_before(&trades, &sell));
        assert!(!held_before(&trades, &buy));
        assert!(!held_before(&trades, &other_token_sell));
    }
}
