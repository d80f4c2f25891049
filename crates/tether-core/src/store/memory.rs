//! In-memory thread store, mirroring the SQLite store's semantics.
//!
//! Used by tests and as a fallback when no durable path is available.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{DEFAULT_THREAD_CAP, StoreError, ThreadStore};
use crate::session::thread::{ChatThread, ThreadSummary};

pub struct InMemoryThreadStore {
    threads: RwLock<HashMap<String, ChatThread>>,
    index_cap: usize,
    save_count: AtomicU64,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            index_cap: DEFAULT_THREAD_CAP,
            save_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_index_cap(mut self, cap: usize) -> Self {
        self.index_cap = cap.max(1);
        self
    }

    /// Number of snapshot writes that actually landed (stale saves excluded).
    pub fn save_count(&self) -> u64 {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn save_thread(&self, thread: &ChatThread) -> Result<(), StoreError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;

        if let Some(existing) = threads.get(&thread.id) {
            if existing.updated_at >= thread.updated_at {
                return Ok(());
            }
        }

        threads.insert(thread.id.clone(), thread.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);

        while threads.len() > self.index_cap {
            let oldest = threads
                .values()
                .min_by_key(|t| t.updated_at)
                .map(|t| t.id.clone());
            match oldest {
                Some(id) => {
                    threads.remove(&id);
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn get_thread(&self, id: &str) -> Result<Option<ChatThread>, StoreError> {
        let threads = self
            .threads
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(threads.get(id).cloned())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, StoreError> {
        let threads = self
            .threads
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let mut summaries: Vec<ThreadSummary> = threads.values().map(ChatThread::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete_thread(&self, id: &str) -> Result<(), StoreError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        threads.remove(id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut threads = self
            .threads
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        threads.clear();
        Ok(())
    }
}
