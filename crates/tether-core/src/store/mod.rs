//! Durable thread persistence.
//!
//! Writes are last-write-wins on the thread's `updated_at`: a save carrying
//! a timestamp at or before the stored one is skipped, so a late debounced
//! write can never clobber a newer snapshot.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::thread::{ChatThread, ThreadSummary};

mod debounce;
mod memory;
mod sqlite;

pub use debounce::SaveScheduler;
pub use memory::InMemoryThreadStore;
pub use sqlite::SqliteThreadStore;

/// Most-recent threads kept in the index; older entries are evicted on save.
pub const DEFAULT_THREAD_CAP: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Persistent store for chat threads plus a bounded recency index.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Persist a full thread snapshot, last-write-wins on `updated_at`.
    async fn save_thread(&self, thread: &ChatThread) -> Result<(), StoreError>;

    async fn get_thread(&self, id: &str) -> Result<Option<ChatThread>, StoreError>;

    /// Index entries, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError>;

    async fn delete_thread(&self, id: &str) -> Result<(), StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;
}
