//! Typed queries against the orderbook subgraph.
//!
//! Numeric fields arrive as decimal strings of micro-units and are parsed
//! at this edge; wallets are normalized to lowercase here so everything
//! downstream compares exactly.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::graphql::GraphqlClient;
use crate::config::IndexerConfig;
use crate::types::{
    fixed, AccountHistory, DataSource, Fill, MarketToken, Position, Redemption, Side,
};
use crate::{Error, Result};

/// The indexer's documented maximum page size.
pub const PAGE_SIZE: usize = 1000;

pub struct SubgraphClient {
    gql: GraphqlClient,
    batch_size: usize,
    batch_delay: std::time::Duration,
}

impl SubgraphClient {
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            gql: GraphqlClient::new(config),
            batch_size: config.batch_size,
            batch_delay: std::time::Duration::from_millis(config.batch_delay_ms),
        }
    }

    /// Fills for one token, newest first, paginated on a timestamp cursor
    /// (`timestamp_lt` continuation). Bounds are inclusive; `max` caps the
    /// total row count.
    pub async fn fetch_fills(
        &self,
        token_id: &str,
        after: Option<i64>,
        before: Option<i64>,
        max: Option<usize>,
    ) -> Result<Vec<Fill>> {
        let mut fills: Vec<Fill> = Vec::new();
        let mut cursor: Option<i64> = None;

        loop {
            let mut clauses = vec![format!(r#"market: "{token_id}""#)];
            if let Some(after) = after {
                clauses.push(format!("timestamp_gte: {after}"));
            }
            match cursor {
                Some(cursor) => clauses.push(format!("timestamp_lt: {cursor}")),
                None => {
                    if let Some(before) = before {
                        clauses.push(format!("timestamp_lte: {before}"));
                    }
                }
            }

            let query = format!(
                "query {{
                    enrichedOrderFilleds(
                        first: {PAGE_SIZE}
                        orderBy: timestamp
                        orderDirection: desc
                        where: {{ {} }}
                    ) {{
                        id
                        transactionHash
                        timestamp
                        orderHash
                        side
                        size
                        price
                        maker {{ id }}
                        taker {{ id }}
                        market {{ id }}
                    }}
                }}",
                clauses.join(", ")
            );

            let data = self.gql.execute(&query, json!({})).await?;
            let page = match data {
                Some(data) => parse_fills(&data)?,
                None => Vec::new(),
            };
            let page_len = page.len();
            debug!(token_id, page_len, "fetched fill page");

            cursor = page.last().map(|f| f.timestamp);
            fills.extend(page);

            if page_len < PAGE_SIZE {
                break;
            }
            if max.is_some_and(|max| fills.len() >= max) {
                break;
            }
        }

        if let Some(max) = max {
            fills.truncate(max);
        }
        Ok(fills)
    }

    /// Lifetime summary for one wallet, when the subgraph knows it.
    pub async fn fetch_account(&self, wallet: &str) -> Result<Option<AccountHistory>> {
        let wallet = wallet.to_lowercase();
        let query = r#"
            query Account($id: ID!) {
                account(id: $id) {
                    id
                    creationTimestamp
                    lastSeenTimestamp
                    collateralVolume
                    numTrades
                    profit
                    scaledProfit
                }
            }"#;

        let data = self.gql.execute(query, json!({ "id": wallet })).await?;
        Ok(data
            .as_ref()
            .and_then(|d| d.get("account"))
            .filter(|a| !a.is_null())
            .map(|a| account_from_value(&wallet, a)))
    }

    /// Summaries for a batch of wallets, folded into aliased queries of at
    /// most `batch_size` accounts each, with a short delay between chunks
    /// to stay inside the indexer's rate budget. Wallets the subgraph does
    /// not know are absent from the result.
    pub async fn fetch_accounts(&self, wallets: &[String]) -> Result<Vec<AccountHistory>> {
        let mut histories = Vec::with_capacity(wallets.len());

        for (chunk_index, chunk) in wallets.chunks(self.batch_size.max(1)).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let aliases: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, wallet)| {
                    format!(
                        r#"a{i}: account(id: "{}") {{
                            id
                            creationTimestamp
                            lastSeenTimestamp
                            collateralVolume
                            numTrades
                            profit
                            scaledProfit
                        }}"#,
                        wallet.to_lowercase()
                    )
                })
                .collect();
            let query = format!("query {{ {} }}", aliases.join("\n"));

            let data = self.gql.execute(&query, json!({})).await?;
            let Some(data) = data else { continue };

            for (i, wallet) in chunk.iter().enumerate() {
                let wallet = wallet.to_lowercase();
                if let Some(account) = data.get(format!("a{i}")).filter(|a| !a.is_null()) {
                    histories.push(account_from_value(&wallet, account));
                }
            }
        }

        Ok(histories)
    }

    /// Redemption payouts for a wallet.
    pub async fn fetch_redemptions(&self, wallet: &str) -> Result<Vec<Redemption>> {
        let wallet = wallet.to_lowercase();
        let query = r#"
            query Redemptions($wallet: String!) {
                redemptions(first: 1000, where: { redeemer: $wallet }) {
                    id
                    timestamp
                    payout
                    condition { id }
                }
            }"#;

        let data = self.gql.execute(query, json!({ "wallet": wallet })).await?;
        let Some(data) = data else {
            return Ok(Vec::new());
        };
        let rows = data
            .get("redemptions")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedResponse("redemptions is not a list".into()))?;

        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(Redemption {
                    id: r.get("id")?.as_str()?.to_string(),
                    wallet: wallet.clone(),
                    condition_id: r
                        .get("condition")
                        .and_then(|c| c.get("id"))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    timestamp: parse_i64(r.get("timestamp")?)?,
                    payout: parse_micro_value(r.get("payout")?)?,
                })
            })
            .collect())
    }

    /// A wallet's open positions.
    pub async fn fetch_positions(&self, wallet: &str) -> Result<Vec<Position>> {
        let query = r#"
            query Positions($wallet: String!) {
                marketPositions(first: 1000, where: { user: $wallet }) {
                    id
                    market { id }
                    netValue
                    netQuantity
                }
            }"#;

        let data = self
            .gql
            .execute(query, json!({ "wallet": wallet.to_lowercase() }))
            .await?;
        let Some(data) = data else {
            return Ok(Vec::new());
        };
        let rows = data
            .get("marketPositions")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedResponse("marketPositions is not a list".into()))?;

        Ok(rows
            .iter()
            .filter_map(|p| {
                Some(Position {
                    token_id: p
                        .get("market")
                        .and_then(|m| m.get("id"))
                        .and_then(Value::as_str)?
                        .to_string(),
                    net_quantity: parse_micro_value(p.get("netQuantity")?)?,
                    net_value: parse_micro_value(p.get("netValue")?)?,
                })
            })
            .collect())
    }

    /// Condition and outcome-index metadata for a batch of tokens.
    pub async fn fetch_token_metadata(&self, token_ids: &[String]) -> Result<Vec<MarketToken>> {
        let mut tokens = Vec::with_capacity(token_ids.len());

        for (chunk_index, chunk) in token_ids.chunks(self.batch_size.max(1)).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let aliases: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, token_id)| {
                    format!(
                        r#"t{i}: marketData(id: "{token_id}") {{
                            id
                            condition {{ id }}
                            outcomeIndex
                        }}"#
                    )
                })
                .collect();
            let query = format!("query {{ {} }}", aliases.join("\n"));

            let data = self.gql.execute(&query, json!({})).await?;
            let Some(data) = data else { continue };

            for (i, token_id) in chunk.iter().enumerate() {
                let Some(entry) = data.get(format!("t{i}")).filter(|t| !t.is_null()) else {
                    warn!(token_id = %token_id, "no metadata for token");
                    continue;
                };
                let condition_id = entry
                    .get("condition")
                    .and_then(|c| c.get("id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let outcome_index = entry
                    .get("outcomeIndex")
                    .and_then(parse_i64)
                    .unwrap_or(0) as u8;
                tokens.push(MarketToken {
                    token_id: token_id.clone(),
                    condition_id,
                    question: String::new(),
                    outcome: String::new(),
                    outcome_index,
                    created_at: None,
                    resolved_at: None,
                });
            }
        }

        Ok(tokens)
    }

    /// Count a wallet's fills directly, capped at one page per role. Used
    /// when the subgraph's `numTrades` aggregate looks stale against the
    /// wallet's reported volume.
    pub async fn fetch_wallet_fill_count(&self, wallet: &str) -> Result<i64> {
        let wallet = wallet.to_lowercase();
        let query = format!(
            r#"query {{
                asMaker: enrichedOrderFilleds(first: {PAGE_SIZE}, where: {{ maker: "{wallet}" }}) {{ id }}
                asTaker: enrichedOrderFilleds(first: {PAGE_SIZE}, where: {{ taker: "{wallet}" }}) {{ id }}
            }}"#
        );

        let data = self.gql.execute(&query, json!({})).await?;
        let count = |key: &str| -> i64 {
            data.as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_array)
                .map(|rows| rows.len() as i64)
                .unwrap_or(0)
        };
        Ok(count("asMaker") + count("asTaker"))
    }
}

fn parse_fills(data: &Value) -> Result<Vec<Fill>> {
    let rows = data
        .get("enrichedOrderFilleds")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedResponse("enrichedOrderFilleds is not a list".into()))?;

    let mut fills = Vec::with_capacity(rows.len());
    for row in rows {
        match fill_from_value(row) {
            Some(fill) => fills.push(fill),
            None => warn!("skipping malformed fill record"),
        }
    }
    Ok(fills)
}

fn fill_from_value(row: &Value) -> Option<Fill> {
    let side = match row.get("side")?.as_str()? {
        "Buy" | "BUY" => Side::Buy,
        "Sell" | "SELL" => Side::Sell,
        _ => return None,
    };
    Some(Fill {
        id: row.get("id")?.as_str()?.to_string(),
        transaction_hash: row.get("transactionHash")?.as_str()?.to_string(),
        timestamp: parse_i64(row.get("timestamp")?)?,
        order_hash: row
            .get("orderHash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        side,
        size: parse_micro_value(row.get("size")?)?,
        price: parse_micro_value(row.get("price")?)?,
        maker: nested_id(row, "maker")?.to_lowercase(),
        taker: nested_id(row, "taker")?.to_lowercase(),
        token_id: nested_id(row, "market")?,
    })
}

fn nested_id(row: &Value, key: &str) -> Option<String> {
    row.get(key)?
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn account_from_value(wallet: &str, account: &Value) -> AccountHistory {
    AccountHistory {
        wallet: wallet.to_string(),
        created_at: account.get("creationTimestamp").and_then(parse_i64),
        first_trade_at: account.get("creationTimestamp").and_then(parse_i64),
        last_trade_at: account.get("lastSeenTimestamp").and_then(parse_i64),
        total_trades: account
            .get("numTrades")
            .and_then(parse_i64)
            .unwrap_or(0),
        total_volume: account
            .get("collateralVolume")
            .and_then(parse_micro_value)
            .unwrap_or(0),
        total_profit: account
            .get("profit")
            .and_then(parse_micro_value)
            .unwrap_or(0),
        redemption_payout: 0,
        data_source: DataSource::Subgraph,
    }
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_micro_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => fixed::parse_micro(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_parsing_normalizes_wallets() {
        let row = json!({
            "id": "0xfill",
            "transactionHash": "0xtx",
            "timestamp": "1700000000",
            "orderHash": "0xord",
            "side": "Sell",
            "size": "1000000000",
            "price": "100000",
            "maker": { "id": "0xMAKER" },
            "taker": { "id": "0xTAKER" },
            "market": { "id": "token-1" }
        });

        let fill = fill_from_value(&row).unwrap();
        assert_eq!(fill.maker, "0xmaker");
        assert_eq!(fill.taker, "0xtaker");
        assert_eq!(fill.size, 1_000_000_000);
        assert_eq!(fill.price, 100_000);
        assert_eq!(fill.side, Side::Sell);
    }

    #[test]
    fn test_fill_parsing_rejects_unknown_side() {
        let row = json!({
            "id": "x",
            "transactionHash": "0xtx",
            "timestamp": 1,
            "side": "Short",
            "size": "1",
            "price": "1",
            "maker": { "id": "a" },
            "taker": { "id": "b" },
            "market": { "id": "t" }
        });
        assert!(fill_from_value(&row).is_none());
    }

    #[test]
    fn test_account_parsing() {
        let account = json!({
            "id": "0xw",
            "creationTimestamp": "1690000000",
            "lastSeenTimestamp": "1700000000",
            "collateralVolume": "123456789",
            "numTrades": "42",
            "profit": "-5000000",
            "scaledProfit": "-5000000"
        });

        let history = account_from_value("0xw", &account);
        assert_eq!(history.created_at, Some(1_690_000_000));
        assert_eq!(history.total_trades, 42);
        assert_eq!(history.total_volume, 123_456_789);
        assert_eq!(history.total_profit, -5_000_000);
        assert_eq!(history.data_source, DataSource::Subgraph);
    }
}
