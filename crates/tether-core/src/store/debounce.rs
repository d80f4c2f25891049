//! Trailing-edge debounce for thread saves.
//!
//! Mid-stream deltas can arrive every few milliseconds; persisting each one
//! would hammer the store. Each scheduled save resets the window, so only
//! the last snapshot of a burst is written. Terminal commits bypass the
//! window entirely via [`SaveScheduler::flush_now`].

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ThreadStore;
use crate::session::thread::ChatThread;

pub struct SaveScheduler {
    store: Arc<dyn ThreadStore>,
    window: Duration,
    pending: Option<CancellationToken>,
}

impl SaveScheduler {
    pub fn new(store: Arc<dyn ThreadStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            pending: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    /// Schedule a save of this snapshot after the debounce window,
    /// superseding any save still waiting.
    pub fn schedule_save(&mut self, thread: &ChatThread) {
        self.cancel_pending();

        let token = CancellationToken::new();
        let guard = token.clone();
        let store = self.store.clone();
        let snapshot = thread.clone();
        let window = self.window;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = guard.cancelled() => {}
                () = tokio::time::sleep(window) => {
                    write(store.as_ref(), &snapshot).await;
                }
            }
        });
        self.pending = Some(token);
    }

    /// Write immediately, dropping any pending debounced save. The store's
    /// last-write-wins check still applies.
    pub async fn flush_now(&mut self, thread: &ChatThread) {
        self.cancel_pending();
        write(self.store.as_ref(), thread).await;
    }

    /// Drop a pending save without writing.
    pub fn cancel_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

async fn write(store: &dyn ThreadStore, thread: &ChatThread) {
    match store.save_thread(thread).await {
        Ok(()) => {
            debug!(target: "store::debounce", thread_id = %thread.id, "thread saved");
        }
        Err(e) => {
            warn!(
                target: "store::debounce",
                thread_id = %thread.id,
                error = %e,
                "thread save failed"
            );
        }
    }
}
