//! Account summary storage with monotone sync watermarks.

use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::Store;
use crate::types::{Account, AccountHistory, DataSource};
use crate::Result;

impl Store {
    /// Upsert an account summary. Watermarks widen monotonically; summary
    /// fields take the incoming values.
    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts
                (wallet, created_at, synced_from, synced_to, synced_at, has_full_history,
                 total_trades, total_volume, total_profit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(wallet) DO UPDATE SET
                created_at = COALESCE(excluded.created_at, accounts.created_at),
                synced_from = CASE
                    WHEN excluded.synced_from IS NULL THEN accounts.synced_from
                    WHEN accounts.synced_from IS NULL THEN excluded.synced_from
                    ELSE MIN(accounts.synced_from, excluded.synced_from)
                END,
                synced_to = CASE
                    WHEN excluded.synced_to IS NULL THEN accounts.synced_to
                    WHEN accounts.synced_to IS NULL THEN excluded.synced_to
                    ELSE MAX(accounts.synced_to, excluded.synced_to)
                END,
                synced_at = excluded.synced_at,
                has_full_history = MAX(accounts.has_full_history, excluded.has_full_history),
                total_trades = excluded.total_trades,
                total_volume = excluded.total_volume,
                total_profit = excluded.total_profit",
        )
        .bind(account.wallet.to_lowercase())
        .bind(account.created_at)
        .bind(account.synced_from)
        .bind(account.synced_to)
        .bind(account.synced_at.map(|at| at.timestamp()))
        .bind(account.has_full_history)
        .bind(account.total_trades)
        .bind(account.total_volume)
        .bind(account.total_profit)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_account(&self, wallet: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE wallet = ?1")
            .bind(wallet.to_lowercase())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(account_from_row))
    }

    /// Advance a wallet's upper watermark; it never moves backwards.
    pub async fn update_account_synced_to(&self, wallet: &str, ts: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (wallet, synced_to, synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(wallet) DO UPDATE SET
                synced_to = CASE
                    WHEN accounts.synced_to IS NULL THEN excluded.synced_to
                    ELSE MAX(accounts.synced_to, excluded.synced_to)
                END,
                synced_at = excluded.synced_at",
        )
        .bind(wallet.to_lowercase())
        .bind(ts)
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Mark a wallet's stored fill history as reaching back to its first
    /// trade.
    pub async fn mark_account_complete(&self, wallet: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (wallet, has_full_history, synced_at) VALUES (?1, 1, ?2)
             ON CONFLICT(wallet) DO UPDATE SET
                has_full_history = 1,
                synced_at = excluded.synced_at",
        )
        .bind(wallet.to_lowercase())
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Persist a resolved history so later runs start from the cache.
    pub async fn save_account_summary(&self, history: &AccountHistory) -> Result<()> {
        let account = Account {
            wallet: history.wallet.to_lowercase(),
            created_at: history.created_at,
            synced_from: None,
            synced_to: None,
            synced_at: Some(Utc::now()),
            has_full_history: false,
            total_trades: history.total_trades,
            total_volume: history.total_volume,
            total_profit: history.combined_profit(),
        };
        self.save_account(&account).await
    }

    /// A cached history for a wallet, when one has been stored.
    pub async fn get_cached_history(&self, wallet: &str) -> Result<Option<AccountHistory>> {
        Ok(self.get_account(wallet).await?.map(|account| AccountHistory {
            wallet: account.wallet,
            created_at: account.created_at,
            first_trade_at: account.synced_from,
            last_trade_at: account.synced_to,
            total_trades: account.total_trades,
            total_volume: account.total_volume,
            total_profit: account.total_profit,
            redemption_payout: 0,
            data_source: DataSource::Cache,
        }))
    }
}

fn account_from_row(row: SqliteRow) -> Account {
    Account {
        wallet: row.get("wallet"),
        created_at: row.get("created_at"),
        synced_from: row.get("synced_from"),
        synced_to: row.get("synced_to"),
        synced_at: row
            .get::<Option<i64>, _>("synced_at")
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        has_full_history: row.get::<i64, _>("has_full_history") != 0,
        total_trades: row.get("total_trades"),
        total_volume: row.get("total_volume"),
        total_profit: row.get("total_profit"),
    }
}
