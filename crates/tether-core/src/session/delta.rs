use std::collections::BTreeMap;

use crate::session::thread::{Message, TodoItem};

/// One incremental piece of domain state extracted from an event record.
///
/// A single record can yield several deltas; they are applied in the order
/// they were extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDelta {
    /// Complete message-list snapshot from the agent's state.
    Messages(Vec<Message>),

    /// Complete todo-list snapshot. An empty list clears the todos;
    /// malformed payloads yield no delta at all.
    Todos(Vec<TodoItem>),

    /// Complete file-set snapshot, path to content.
    Files(BTreeMap<String, String>),

    /// Transport metadata that is not a task lifecycle signal.
    Metadata(serde_json::Value),

    /// A delegated sub-task started, keyed by its tool-call id.
    TaskStarted {
        id: String,
        name: String,
        description: String,
    },

    /// A delegated sub-task finished, keyed by the same tool-call id.
    TaskCompleted { id: String, result: String },

    /// A recoverable error surfaced by the stream or a malformed payload.
    Error(String),

    /// Terminal record; nothing after it in the same batch is processed.
    End,
}

impl AgentDelta {
    pub fn is_end(&self) -> bool {
        matches!(self, AgentDelta::End)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AgentDelta::Error(_))
    }
}
