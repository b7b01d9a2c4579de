//! Data-API client — the fallback plane for wallets the subgraph does not
//! aggregate. Serves raw trade lists; totals are derived locally.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::IndexerConfig;
use crate::types::{fixed, AccountHistory, DataSource};
use crate::{Error, Result};

pub struct DataApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

/// One trade row from the data-API. Sizes and prices come back as plain
/// JSON numbers in whole units.
#[derive(Debug, Clone, Deserialize)]
pub struct DataApiTrade {
    #[serde(rename = "proxyWallet")]
    pub proxy_wallet: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub timestamp: i64,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: String,
}

impl DataApiClient {
    pub fn new(config: &IndexerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.data_api_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Recent trades for a wallet, newest first.
    pub async fn fetch_trades(&self, wallet: &str, limit: usize) -> Result<Vec<DataApiTrade>> {
        let url = format!(
            "{}/trades?user={}&limit={}",
            self.base_url,
            wallet.to_lowercase(),
            limit
        );

        let response = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited { retry_after: None });
        }
        if !status.is_success() {
            return Err(Error::IndexerUnavailable(format!("HTTP {status}")));
        }

        let trades: Vec<DataApiTrade> = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;
        debug!(wallet, count = trades.len(), "fetched data-api trades");
        Ok(trades)
    }

    /// Derive an account summary from the trade list. Returns `None` for a
    /// wallet with no trades at all.
    pub async fn fetch_account(&self, wallet: &str) -> Result<Option<AccountHistory>> {
        let trades = self.fetch_trades(wallet, 1000).await?;
        Ok(summarize_trades(wallet, &trades))
    }
}

fn summarize_trades(wallet: &str, trades: &[DataApiTrade]) -> Option<AccountHistory> {
    if trades.is_empty() {
        return None;
    }

    let mut volume: i64 = 0;
    let mut first = i64::MAX;
    let mut last = i64::MIN;
    for trade in trades {
        volume += fixed::from_f64(trade.size * trade.price);
        first = first.min(trade.timestamp);
        last = last.max(trade.timestamp);
    }

    Some(AccountHistory {
        wallet: wallet.to_lowercase(),
        created_at: None,
        first_trade_at: Some(first),
        last_trade_at: Some(last),
        total_trades: trades.len() as i64,
        total_volume: volume,
        // The trade list alone does not close positions; profit is unknown
        // from this plane.
        total_profit: 0,
        redemption_payout: 0,
        data_source: DataSource::DataApi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(size: f64, price: f64, timestamp: i64) -> DataApiTrade {
        DataApiTrade {
            proxy_wallet: "0xW".into(),
            side: "BUY".into(),
            size,
            price,
            timestamp,
            transaction_hash: "0xtx".into(),
        }
    }

    #[test]
    fn test_summary_derives_totals() {
        let trades = vec![
            trade(1000.0, 0.10, 1_700_000_000),
            trade(2000.0, 0.20, 1_700_100_000),
        ];
        let history = summarize_trades("0xW", &trades).unwrap();

        assert_eq!(history.total_trades, 2);
        // $100 + $400
        assert_eq!(history.total_volume, 500_000_000);
        assert_eq!(history.first_trade_at, Some(1_700_000_000));
        assert_eq!(history.last_trade_at, Some(1_700_100_000));
        assert_eq!(history.data_source, DataSource::DataApi);
    }

    #[test]
    fn test_empty_trade_list_is_no_account() {
        assert!(summarize_trades("0xW", &[]).is_none());
    }
}
