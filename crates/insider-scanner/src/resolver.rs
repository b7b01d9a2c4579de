//! Market resolution: token ids to (condition, outcome-index) pairs, cached
//! through the store.

use std::collections::HashMap;

use polymarket_core::api::SubgraphClient;
use polymarket_core::db::Store;
use polymarket_core::types::MarketToken;
use polymarket_core::Result;
use tracing::{debug, warn};

pub struct MarketResolver<'a> {
    store: &'a Store,
    subgraph: &'a SubgraphClient,
}

impl<'a> MarketResolver<'a> {
    pub fn new(store: &'a Store, subgraph: &'a SubgraphClient) -> Self {
        Self { store, subgraph }
    }

    /// Resolve a batch of tokens, serving from the store first and fetching
    /// only the misses. Tokens the indexer does not know stay absent from
    /// the result; callers treat their fills as unmappable.
    pub async fn resolve(&self, token_ids: &[String]) -> Result<HashMap<String, MarketToken>> {
        let mut resolved: HashMap<String, MarketToken> = HashMap::new();

        for market in self.store.get_markets(token_ids).await? {
            // A stub row written by the watermark protocol has no condition
            // yet; treat it as a miss.
            if !market.condition_id.is_empty() {
                resolved.insert(market.token_id.clone(), market);
            }
        }

        let misses: Vec<String> = token_ids
            .iter()
            .filter(|id| !resolved.contains_key(*id))
            .cloned()
            .collect();
        if misses.is_empty() {
            return Ok(resolved);
        }

        debug!(
            cached = resolved.len(),
            misses = misses.len(),
            "resolving market tokens"
        );
        let fetched = self.subgraph.fetch_token_metadata(&misses).await?;
        if fetched.len() < misses.len() {
            warn!(
                requested = misses.len(),
                resolved = fetched.len(),
                "some tokens could not be resolved"
            );
        }

        self.store.save_markets(&fetched).await?;
        for market in fetched {
            resolved.insert(market.token_id.clone(), market);
        }

        Ok(resolved)
    }

    /// Both outcome tokens of the condition a token belongs to. Analysis
    /// wants the whole condition even when asked about one side.
    pub async fn resolve_condition(&self, token_id: &str) -> Result<Vec<MarketToken>> {
        let resolved = self.resolve(&[token_id.to_string()]).await?;
        let Some(token) = resolved.get(token_id) else {
            return Ok(Vec::new());
        };
        self.store.get_condition_tokens(&token.condition_id).await
    }
}
