//! Backfill queue: wallets pending deeper history sync.

use chrono::{TimeZone, Utc};
use sqlx::Row;

use super::Store;
use crate::types::BackfillEntry;
use crate::Result;

impl Store {
    /// Queue a wallet for backfill. Re-queueing keeps the higher priority.
    pub async fn queue_backfill(&self, wallet: &str, priority: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO backfill_queue (wallet, priority, queued_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(wallet) DO UPDATE SET
                priority = MAX(backfill_queue.priority, excluded.priority)",
        )
        .bind(wallet.to_lowercase())
        .bind(priority)
        .bind(Utc::now().timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Pending entries, highest priority first, oldest first within a
    /// priority.
    pub async fn get_backfill_queue(&self, limit: Option<i64>) -> Result<Vec<BackfillEntry>> {
        let rows = sqlx::query(
            "SELECT wallet, priority, queued_at FROM backfill_queue
             ORDER BY priority DESC, queued_at ASC
             LIMIT ?1",
        )
        .bind(limit.unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BackfillEntry {
                wallet: row.get("wallet"),
                priority: row.get("priority"),
                queued_at: Utc
                    .timestamp_opt(row.get::<i64, _>("queued_at"), 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .collect())
    }

    pub async fn mark_backfill_complete(&self, wallet: &str) -> Result<()> {
        sqlx::query("DELETE FROM backfill_queue WHERE wallet = ?1")
            .bind(wallet.to_lowercase())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn has_queued_backfill(&self, wallet: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM backfill_queue WHERE wallet = ?1")
                .bind(wallet.to_lowercase())
                .fetch_one(self.pool())
                .await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_orders_by_priority() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_backfill("0xlow", 1).await.unwrap();
        store.queue_backfill("0xhigh", 10).await.unwrap();
        store.queue_backfill("0xmid", 5).await.unwrap();

        let queue = store.get_backfill_queue(Some(2)).await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].wallet, "0xhigh");
        assert_eq!(queue[1].wallet, "0xmid");
    }

    #[tokio::test]
    async fn test_requeue_keeps_higher_priority() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_backfill("0xW", 8).await.unwrap();
        store.queue_backfill("0xW", 3).await.unwrap();

        let queue = store.get_backfill_queue(None).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].priority, 8);
    }

    #[tokio::test]
    async fn test_complete_removes_entry() {
        let store = Store::open_in_memory().await.unwrap();
        store.queue_backfill("0xW", 1).await.unwrap();
        assert!(store.has_queued_backfill("0xW").await.unwrap());

        store.mark_backfill_complete("0xW").await.unwrap();
        assert!(!store.has_queued_backfill("0xw").await.unwrap());
    }
}
