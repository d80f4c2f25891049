//! Client-side session engine for a streamed conversational agent.
//!
//! The agent answers each turn as one long-lived HTTP response containing
//! blank-line-delimited event records. This crate frames those records
//! ([`api::sse`]), dispatches them into typed deltas ([`session::dispatch`]),
//! reconciles the deltas into canonical thread state
//! ([`session::SessionReconciler`]), reveals assistant text progressively
//! ([`session::reveal`]), and persists threads with debounced
//! last-write-wins saves ([`store`]).

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use api::AgentClient;
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use session::{AgentDelta, ChatThread, SessionReconciler};
pub use store::{InMemoryThreadStore, SqliteThreadStore, ThreadStore};
