//! Fill storage: idempotent batch inserts and time-indexed lookups.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::markets::MarketSyncUpdate;
use super::Store;
use crate::types::{Fill, Side, TradeRole};
use crate::Result;

/// Filters for per-wallet fill queries. Results come back timestamp
/// descending.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletFillQuery {
    /// Strict upper bound on timestamp.
    pub before: Option<i64>,
    pub role: TradeRole,
    pub limit: Option<i64>,
}

/// Filters for per-token fill queries. Results come back timestamp
/// descending.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketFillQuery {
    /// Inclusive lower bound on timestamp.
    pub after: Option<i64>,
    /// Inclusive upper bound on timestamp.
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

impl Store {
    /// Insert a batch of fills, ignoring ids already present. One
    /// transaction per batch; returns the count of newly inserted rows.
    pub async fn save_fills(&self, fills: &[Fill]) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let inserted = insert_fills(&mut tx, fills).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Insert a fill delta and advance the token's sync watermarks in the
    /// same transaction, so a reader that sees the new watermarks is
    /// guaranteed to see the fills they cover.
    pub async fn save_fills_and_sync(
        &self,
        token_id: &str,
        fills: &[Fill],
        sync: MarketSyncUpdate,
    ) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let inserted = insert_fills(&mut tx, fills).await?;
        super::markets::apply_sync_update(&mut tx, token_id, sync).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// A wallet's fills, newest first.
    pub async fn get_fills_for_wallet(
        &self,
        wallet: &str,
        query: WalletFillQuery,
    ) -> Result<Vec<Fill>> {
        let wallet = wallet.to_lowercase();
        let role_clause = match query.role {
            TradeRole::Maker => "maker = ?1",
            TradeRole::Taker => "taker = ?1",
            TradeRole::Both => "(maker = ?1 OR taker = ?1)",
        };
        let sql = format!(
            "SELECT * FROM fills
             WHERE {role_clause}
               AND (?2 IS NULL OR timestamp < ?2)
             ORDER BY timestamp DESC
             LIMIT ?3"
        );

        let rows = sqlx::query(&sql)
            .bind(&wallet)
            .bind(query.before)
            .bind(query.limit.unwrap_or(i64::MAX))
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(fill_from_row).collect()
    }

    /// A token's fills, newest first.
    pub async fn get_fills_for_market(
        &self,
        token_id: &str,
        query: MarketFillQuery,
    ) -> Result<Vec<Fill>> {
        let rows = sqlx::query(
            "SELECT * FROM fills
             WHERE token_id = ?1
               AND (?2 IS NULL OR timestamp >= ?2)
               AND (?3 IS NULL OR timestamp <= ?3)
             ORDER BY timestamp DESC
             LIMIT ?4",
        )
        .bind(token_id)
        .bind(query.after)
        .bind(query.before)
        .bind(query.limit.unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(fill_from_row).collect()
    }

    /// Count and most-recent-timestamp of a wallet's fills strictly before
    /// `ts`. The strict bound matters: queried at a fill's own timestamp,
    /// that fill is excluded.
    pub async fn count_fills_before(&self, wallet: &str, ts: i64) -> Result<(i64, Option<i64>)> {
        let wallet = wallet.to_lowercase();
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, MAX(timestamp) AS last
             FROM fills
             WHERE (maker = ?1 OR taker = ?1) AND timestamp < ?2",
        )
        .bind(&wallet)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;

        Ok((row.get("n"), row.get("last")))
    }
}

pub(super) async fn insert_fills(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    fills: &[Fill],
) -> Result<u64> {
    let mut inserted = 0;
    for fill in fills {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO fills
                (id, transaction_hash, timestamp, order_hash, side, size, price, maker, taker, token_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&fill.id)
        .bind(&fill.transaction_hash)
        .bind(fill.timestamp)
        .bind(&fill.order_hash)
        .bind(fill.side.as_str())
        .bind(fill.size)
        .bind(fill.price)
        .bind(fill.maker.to_lowercase())
        .bind(fill.taker.to_lowercase())
        .bind(&fill.token_id)
        .execute(&mut **tx)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

pub(super) fn fill_from_row(row: &SqliteRow) -> Result<Fill> {
    let side = match row.get::<String, _>("side").as_str() {
        "BUY" => Side::Buy,
        _ => Side::Sell,
    };
    Ok(Fill {
        id: row.get("id"),
        transaction_hash: row.get("transaction_hash"),
        timestamp: row.get("timestamp"),
        order_hash: row.get("order_hash"),
        side,
        size: row.get("size"),
        price: row.get("price"),
        maker: row.get("maker"),
        taker: row.get("taker"),
        token_id: row.get("token_id"),
    })
}
