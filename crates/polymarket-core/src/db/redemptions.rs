//! Redemption storage.

use sqlx::Row;

use super::Store;
use crate::types::Redemption;
use crate::Result;

impl Store {
    /// Insert redemptions, ignoring ids already present.
    pub async fn save_redemptions(&self, redemptions: &[Redemption]) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;
        for redemption in redemptions {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO redemptions (id, wallet, condition_id, timestamp, payout)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&redemption.id)
            .bind(redemption.wallet.to_lowercase())
            .bind(&redemption.condition_id)
            .bind(redemption.timestamp)
            .bind(redemption.payout)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_redemptions_for_wallet(&self, wallet: &str) -> Result<Vec<Redemption>> {
        let rows = sqlx::query(
            "SELECT * FROM redemptions WHERE wallet = ?1 ORDER BY timestamp DESC",
        )
        .bind(wallet.to_lowercase())
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Redemption {
                id: row.get("id"),
                wallet: row.get("wallet"),
                condition_id: row.get("condition_id"),
                timestamp: row.get("timestamp"),
                payout: row.get("payout"),
            })
            .collect())
    }
}
