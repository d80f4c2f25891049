//! SQLite-backed thread store.
//!
//! Snapshots are stored as JSON blobs; the index table is a denormalized
//! projection kept in the same transaction as the snapshot write, so the
//! two can never disagree.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Row,
    sqlite::{
        SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
    },
};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::{DEFAULT_THREAD_CAP, StoreError, ThreadStore};
use crate::session::thread::{ChatThread, ThreadSummary};

pub struct SqliteThreadStore {
    pool: SqlitePool,
    index_cap: usize,
}

impl SqliteThreadStore {
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            index_cap: DEFAULT_THREAD_CAP,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(StoreError::Database)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            index_cap: DEFAULT_THREAD_CAP,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    #[must_use]
    pub fn with_index_cap(mut self, cap: usize) -> Self {
        self.index_cap = cap.max(1);
        self
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS thread_snapshots (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("failed to create snapshots table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS thread_index (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("failed to create index table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_thread_index_updated
             ON thread_index(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("failed to create recency index: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn save_thread(&self, thread: &ChatThread) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<DateTime<Utc>> =
            sqlx::query("SELECT updated_at FROM thread_index WHERE id = ?1")
                .bind(&thread.id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get("updated_at"))
                .transpose()?;

        // Last-write-wins: an equal timestamp keeps the stored snapshot.
        if let Some(stored) = existing {
            if stored >= thread.updated_at {
                debug!(
                    target: "store::sqlite",
                    thread_id = %thread.id,
                    "skipping stale save"
                );
                return Ok(());
            }
        }

        let data = serde_json::to_string(thread)?;
        let summary = thread.summary();

        sqlx::query(
            r#"
            INSERT INTO thread_snapshots (id, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&thread.id)
        .bind(&data)
        .bind(thread.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO thread_index (id, title, message_count, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                message_count = excluded.message_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&thread.id)
        .bind(&summary.title)
        .bind(i64::from(summary.message_count))
        .bind(thread.updated_at)
        .execute(&mut *tx)
        .await?;

        // Evict beyond the recency cap; snapshots follow the index.
        sqlx::query(
            r#"
            DELETE FROM thread_index WHERE id NOT IN (
                SELECT id FROM thread_index ORDER BY updated_at DESC LIMIT ?1
            )
            "#,
        )
        .bind(self.index_cap as i64)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM thread_snapshots WHERE id NOT IN (SELECT id FROM thread_index)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_thread(&self, id: &str) -> Result<Option<ChatThread>, StoreError> {
        let row = sqlx::query("SELECT data FROM thread_snapshots WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, message_count, updated_at
             FROM thread_index ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let message_count: i64 = row.try_get("message_count")?;
            summaries.push(ThreadSummary {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                message_count: message_count.max(0) as u32,
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(summaries)
    }

    async fn delete_thread(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM thread_snapshots WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM thread_index WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM thread_snapshots")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM thread_index")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
