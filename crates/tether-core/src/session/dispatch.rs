//! Payload dispatch: turns one framed event record into typed deltas.
//!
//! Extraction is deliberately tolerant. The agent's state payloads vary in
//! shape (plain lists, `{value: [...]}` wrappers, per-node nesting), and a
//! malformed shape must degrade to "no delta", never to a failure that
//! aborts the rest of the stream.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::api::sse::{DEFAULT_EVENT, SseEvent};
use crate::session::delta::AgentDelta;
use crate::session::thread::{Message, Role, TodoItem, generate_id};

/// Tool-call name identifying the "delegate task" operation.
pub const TASK_TOOL_NAME: &str = "task";

const FALLBACK_TASK_NAME: &str = "agent";
const FALLBACK_TASK_DESCRIPTION: &str = "Processing...";

/// Extract zero or more deltas from one event record.
pub fn dispatch_record(record: &SseEvent) -> Vec<AgentDelta> {
    match record.event.as_str() {
        "end" => vec![AgentDelta::End],
        "metadata" => match serde_json::from_str::<Value>(&record.data) {
            Ok(value) => match task_signal_from_metadata(&value) {
                Some(signal) => vec![signal],
                None => vec![AgentDelta::Metadata(value)],
            },
            Err(e) => vec![AgentDelta::Error(format!("failed to parse metadata: {e}"))],
        },
        // Error payloads are raw text, never JSON.
        "error" => vec![AgentDelta::Error(record.data.clone())],
        "data" | DEFAULT_EVENT => dispatch_data(&record.data),
        other => {
            debug!(target: "session::dispatch", event = other, "ignoring unknown event kind");
            Vec::new()
        }
    }
}

fn dispatch_data(data: &str) -> Vec<AgentDelta> {
    let payload: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            return vec![AgentDelta::Error(format!(
                "failed to parse stream data: {e}"
            ))];
        }
    };

    let Some(object) = payload.as_object() else {
        return Vec::new();
    };

    let mut deltas = Vec::new();
    for (key, value) in object {
        let nested = value.as_object();

        let todos_value = if key == "todos" {
            Some(value)
        } else {
            nested.and_then(|o| o.get("todos"))
        };
        if let Some(raw) = todos_value {
            if let Some(todos) = extract_todos(raw) {
                deltas.push(AgentDelta::Todos(todos));
            }
        }

        let files_value = if key == "files" {
            Some(value)
        } else {
            nested.and_then(|o| o.get("files"))
        };
        if let Some(raw) = files_value {
            if let Some(files) = extract_files(raw) {
                deltas.push(AgentDelta::Files(files));
            }
        }

        if let Some(raw) = nested.and_then(|o| o.get("messages")) {
            let messages = extract_messages(raw);
            if !messages.is_empty() {
                let signals = task_signals_from_messages(&messages);
                deltas.push(AgentDelta::Messages(messages));
                deltas.extend(signals);
            }
        }
    }
    deltas
}

/// Derive sub-task lifecycle signals from a message-list delta: assistant
/// tool calls named [`TASK_TOOL_NAME`] start a task; tool-result messages
/// carrying the matching tool-call id complete it.
fn task_signals_from_messages(messages: &[Message]) -> Vec<AgentDelta> {
    let mut signals = Vec::new();
    for message in messages {
        match message.role {
            Role::Ai => {
                for call in &message.tool_calls {
                    if call.name != TASK_TOOL_NAME || !call.args.is_object() {
                        continue;
                    }
                    signals.push(AgentDelta::TaskStarted {
                        id: call
                            .id
                            .clone()
                            .unwrap_or_else(|| generate_id(FALLBACK_TASK_NAME)),
                        name: first_string_arg(&call.args, &["subagent_type", "agent_type"])
                            .unwrap_or_else(|| FALLBACK_TASK_NAME.to_string()),
                        description: first_string_arg(&call.args, &["description", "task"])
                            .unwrap_or_else(|| FALLBACK_TASK_DESCRIPTION.to_string()),
                    });
                }
            }
            Role::Tool => {
                if message.name.as_deref() == Some(TASK_TOOL_NAME) {
                    if let Some(id) = &message.tool_call_id {
                        signals.push(AgentDelta::TaskCompleted {
                            id: id.clone(),
                            result: message.content.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    signals
}

/// Task signals can also arrive directly on the transport's metadata
/// channel, tagged with a start/complete discriminator.
fn task_signal_from_metadata(value: &Value) -> Option<AgentDelta> {
    let agent = value.get("subAgent")?;
    match value.get("type").and_then(Value::as_str) {
        Some("start") => Some(AgentDelta::TaskStarted {
            id: agent
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| generate_id(FALLBACK_TASK_NAME)),
            name: agent
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_TASK_NAME)
                .to_string(),
            description: agent
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or(FALLBACK_TASK_DESCRIPTION)
                .to_string(),
        }),
        Some("complete") => Some(AgentDelta::TaskCompleted {
            id: agent.get("id").and_then(Value::as_str)?.to_string(),
            result: match agent.get("result") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
        }),
        _ => None,
    }
}

fn first_string_arg(args: &Value, keys: &[&str]) -> Option<String> {
    let object = args.as_object()?;
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Valid if a plain list or a `{value: [...]}` wrapper; otherwise empty.
/// Elements that fail to decode are skipped rather than failing the delta.
pub(crate) fn extract_messages(value: &Value) -> Vec<Message> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("value") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Message>(item.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(target: "session::dispatch", error = %e, "skipping undecodable message");
                None
            }
        })
        .collect()
}

/// Valid if a plain list or a wrapper under `value` or `items`. Returns
/// `None` for anything else: "no delta" must not clear existing todos,
/// while an empty list must.
pub(crate) fn extract_todos(value: &Value) -> Option<Vec<TodoItem>> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match (map.get("value"), map.get("items")) {
            (Some(Value::Array(items)), _) => items.as_slice(),
            (_, Some(Value::Array(items))) => items.as_slice(),
            _ => return None,
        },
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<TodoItem>(item.clone()) {
                Ok(todo) => Some(todo),
                Err(e) => {
                    debug!(target: "session::dispatch", error = %e, "skipping undecodable todo");
                    None
                }
            })
            .collect(),
    )
}

/// Each entry's content may be a string or a list of line-strings; any
/// other shape yields empty content for that file, not an error.
pub(crate) fn extract_files(value: &Value) -> Option<BTreeMap<String, String>> {
    let map = value.as_object()?;
    let mut files = BTreeMap::new();
    for (path, data) in map {
        if !data.is_object() {
            continue;
        }
        files.insert(path.clone(), coerce_file_content(data.get("content")));
    }
    Some(files)
}

fn coerce_file_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}
