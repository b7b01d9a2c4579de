//! Embedded store for fills, markets, accounts, redemptions, and the
//! backfill queue.
//!
//! SQLite in WAL mode: one writer at a time, readers never blocked. All
//! writes are insert-or-ignore or idempotent upserts, so replaying a batch
//! leaves the store unchanged.

mod accounts;
mod backfill;
mod fills;
mod markets;
mod redemptions;

pub use fills::{MarketFillQuery, WalletFillQuery};
pub use markets::MarketSyncUpdate;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::Result;

/// Handle to the embedded database. Cheap to clone; all clones share one
/// pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and bring its
    /// schema up to date.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate(&pool).await?;
        info!(path, "opened store");
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Ordered, idempotent schema migrations. Each entry runs at most once,
/// recorded in `schema_version`; re-running the migrator is a no-op.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        r#"
        CREATE TABLE IF NOT EXISTS fills (
            id TEXT PRIMARY KEY,
            transaction_hash TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            order_hash TEXT NOT NULL,
            side TEXT NOT NULL,
            size INTEGER NOT NULL,
            price INTEGER NOT NULL,
            maker TEXT NOT NULL,
            taker TEXT NOT NULL,
            token_id TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fills_maker_ts ON fills (maker, timestamp);
        CREATE INDEX IF NOT EXISTS idx_fills_taker_ts ON fills (taker, timestamp);
        CREATE INDEX IF NOT EXISTS idx_fills_token_ts ON fills (token_id, timestamp);

        CREATE TABLE IF NOT EXISTS markets (
            token_id TEXT PRIMARY KEY,
            condition_id TEXT NOT NULL DEFAULT '',
            question TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL DEFAULT '',
            outcome_index INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER,
            resolved_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS accounts (
            wallet TEXT PRIMARY KEY,
            created_at INTEGER,
            synced_from INTEGER,
            synced_to INTEGER,
            synced_at INTEGER,
            has_full_history INTEGER NOT NULL DEFAULT 0,
            total_trades INTEGER NOT NULL DEFAULT 0,
            total_volume INTEGER NOT NULL DEFAULT 0,
            total_profit INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS redemptions (
            id TEXT PRIMARY KEY,
            wallet TEXT NOT NULL,
            condition_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            payout INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_redemptions_wallet ON redemptions (wallet);

        CREATE TABLE IF NOT EXISTS backfill_queue (
            wallet TEXT PRIMARY KEY,
            priority INTEGER NOT NULL DEFAULT 0,
            queued_at INTEGER NOT NULL
        );
        "#,
    ),
    // Sync watermarks arrived after markets shipped; ALTERs preserve rows.
    (
        2,
        r#"
        ALTER TABLE markets ADD COLUMN synced_from INTEGER;
        ALTER TABLE markets ADD COLUMN synced_to INTEGER;
        ALTER TABLE markets ADD COLUMN synced_at INTEGER;
        ALTER TABLE markets ADD COLUMN has_complete_history INTEGER NOT NULL DEFAULT 0;
        "#,
    ),
];

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    let current = current.unwrap_or(0);

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        debug!(version, "applying migration");
        let mut tx = pool.begin().await?;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)")
            .bind(version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        // A second run over an up-to-date schema changes nothing.
        migrate(store.pool()).await.unwrap();

        let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().0);
    }

    #[tokio::test]
    async fn test_sync_columns_exist_after_migration() {
        let store = Store::open_in_memory().await.unwrap();
        // The ALTERed columns are queryable on a fresh database.
        sqlx::query("SELECT synced_from, synced_to, synced_at, has_complete_history FROM markets")
            .fetch_all(store.pool())
            .await
            .unwrap();
    }
}
