//! Point-in-time account state: what a wallet looked like strictly before
//! a given instant, from store fills only.

use std::collections::HashMap;

use polymarket_core::db::{Store, WalletFillQuery};
use polymarket_core::types::{MarketToken, WalletStateAt};
use polymarket_core::Result;
use tracing::debug;

use crate::aggregator::{aggregate, AggregateInput};

pub struct PointInTime<'a> {
    store: &'a Store,
}

impl<'a> PointInTime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Derive the wallet's trade count, complementary-filtered volume, and
    /// most recent prior trade as of `ts`. Strictly less-than: a query at
    /// a fill's own timestamp describes the state *before* that fill.
    pub async fn account_state_at(&self, wallet: &str, ts: i64) -> Result<WalletStateAt> {
        let (trade_count, last_trade_at) = self.store.count_fills_before(wallet, ts).await?;

        let fills = self
            .store
            .get_fills_for_wallet(
                wallet,
                WalletFillQuery {
                    before: Some(ts),
                    ..Default::default()
                },
            )
            .await?;

        // Complementary filtering needs token metadata; only what the
        // store already has qualifies (no network from this path).
        let mut token_ids: Vec<String> = fills.iter().map(|f| f.token_id.clone()).collect();
        token_ids.sort();
        token_ids.dedup();
        let tokens: HashMap<String, MarketToken> = self
            .store
            .get_markets(&token_ids)
            .await?
            .into_iter()
            .filter(|m| !m.condition_id.is_empty())
            .map(|m| (m.token_id.clone(), m))
            .collect();

        let aggregation = aggregate(&AggregateInput {
            wallet,
            fills: &fills,
            tokens: &tokens,
            positions: None,
        });

        // Fills without metadata still count toward volume; they just
        // could not be complementary-filtered.
        let volume: i64 = aggregation.trades.iter().map(|t| t.value_usd).sum::<i64>()
            + aggregation
                .unmapped_fills
                .iter()
                .map(|f| f.value_usd())
                .sum::<i64>();

        let covered = match self.store.get_account(wallet).await? {
            Some(account) => {
                account.has_full_history && account.synced_to.is_some_and(|to| to >= ts)
            }
            None => false,
        };
        let approximate = !covered || !aggregation.unmapped_fills.is_empty();

        debug!(
            wallet,
            ts, trade_count, volume, approximate, "derived point-in-time state"
        );

        Ok(WalletStateAt {
            wallet: wallet.to_lowercase(),
            as_of: ts,
            trade_count,
            volume,
            pnl: 0,
            last_trade_at,
            approximate,
        })
    }
}
