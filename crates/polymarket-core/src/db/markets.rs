//! Market metadata storage and the sync-watermark protocol.

use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::Store;
use crate::types::{MarketSync, MarketToken};
use crate::Result;

/// Partial watermark update. `synced_from` only ever shrinks the lower
/// bound, `synced_to` only ever grows the upper bound; `synced_at` is
/// stamped on every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketSyncUpdate {
    pub synced_from: Option<i64>,
    pub synced_to: Option<i64>,
    pub has_complete_history: Option<bool>,
}

impl Store {
    /// Upsert market metadata. Fields the new record leaves unset keep
    /// their stored values; sync watermarks are never touched here.
    pub async fn save_markets(&self, markets: &[MarketToken]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for market in markets {
            sqlx::query(
                "INSERT INTO markets
                    (token_id, condition_id, question, outcome, outcome_index, created_at, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(token_id) DO UPDATE SET
                    condition_id = excluded.condition_id,
                    question = excluded.question,
                    outcome = excluded.outcome,
                    outcome_index = excluded.outcome_index,
                    created_at = COALESCE(excluded.created_at, markets.created_at),
                    resolved_at = COALESCE(excluded.resolved_at, markets.resolved_at)",
            )
            .bind(&market.token_id)
            .bind(&market.condition_id)
            .bind(&market.question)
            .bind(&market.outcome)
            .bind(market.outcome_index as i64)
            .bind(market.created_at)
            .bind(market.resolved_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_market(&self, token_id: &str) -> Result<Option<MarketToken>> {
        let row = sqlx::query("SELECT * FROM markets WHERE token_id = ?1")
            .bind(token_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| market_from_row(&r)).transpose()
    }

    /// Metadata for a batch of tokens; absent tokens are simply missing
    /// from the result.
    pub async fn get_markets(&self, token_ids: &[String]) -> Result<Vec<MarketToken>> {
        let mut markets = Vec::with_capacity(token_ids.len());
        for token_id in token_ids {
            if let Some(market) = self.get_market(token_id).await? {
                markets.push(market);
            }
        }
        Ok(markets)
    }

    /// All tokens sharing a condition (at most the YES and NO sides).
    pub async fn get_condition_tokens(&self, condition_id: &str) -> Result<Vec<MarketToken>> {
        let rows = sqlx::query(
            "SELECT * FROM markets WHERE condition_id = ?1 ORDER BY outcome_index",
        )
        .bind(condition_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(market_from_row).collect()
    }

    /// Current watermarks for a token. A token the store has never seen
    /// reports empty coverage.
    pub async fn get_market_sync(&self, token_id: &str) -> Result<MarketSync> {
        let row = sqlx::query(
            "SELECT synced_from, synced_to, synced_at, has_complete_history
             FROM markets WHERE token_id = ?1",
        )
        .bind(token_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(sync_from_row).unwrap_or_default())
    }

    /// Apply a watermark update outside a fill transaction (used when a
    /// fetch finds no new fills but coverage was still verified).
    pub async fn update_market_sync(&self, token_id: &str, update: MarketSyncUpdate) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        apply_sync_update(&mut tx, token_id, update).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Every token with any sync coverage, for store inspection.
    pub async fn get_synced_tokens(&self, limit: Option<i64>) -> Result<Vec<(String, MarketSync)>> {
        let rows = sqlx::query(
            "SELECT token_id, synced_from, synced_to, synced_at, has_complete_history
             FROM markets
             WHERE synced_from IS NOT NULL OR synced_to IS NOT NULL
             ORDER BY token_id
             LIMIT ?1",
        )
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("token_id"), sync_from_row(row)))
            .collect())
    }
}

pub(super) async fn apply_sync_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    token_id: &str,
    update: MarketSyncUpdate,
) -> Result<()> {
    // A fill delta can land before metadata resolution; make sure the row
    // exists so the watermarks have somewhere to live.
    sqlx::query("INSERT OR IGNORE INTO markets (token_id) VALUES (?1)")
        .bind(token_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "UPDATE markets SET
            synced_from = CASE
                WHEN ?2 IS NULL THEN synced_from
                WHEN synced_from IS NULL THEN ?2
                ELSE MIN(synced_from, ?2)
            END,
            synced_to = CASE
                WHEN ?3 IS NULL THEN synced_to
                WHEN synced_to IS NULL THEN ?3
                ELSE MAX(synced_to, ?3)
            END,
            has_complete_history = COALESCE(?4, has_complete_history),
            synced_at = ?5
         WHERE token_id = ?1",
    )
    .bind(token_id)
    .bind(update.synced_from)
    .bind(update.synced_to)
    .bind(update.has_complete_history)
    .bind(Utc::now().timestamp())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn market_from_row(row: &SqliteRow) -> Result<MarketToken> {
    Ok(MarketToken {
        token_id: row.get("token_id"),
        condition_id: row.get("condition_id"),
        question: row.get("question"),
        outcome: row.get("outcome"),
        outcome_index: row.get::<i64, _>("outcome_index") as u8,
        created_at: row.get("created_at"),
        resolved_at: row.get("resolved_at"),
    })
}

fn sync_from_row(row: SqliteRow) -> MarketSync {
    MarketSync {
        synced_from: row.get("synced_from"),
        synced_to: row.get("synced_to"),
        synced_at: row
            .get::<Option<i64>, _>("synced_at")
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        has_complete_history: row.get::<i64, _>("has_complete_history") != 0,
    }
}
