//! Domain types for a conversation thread.
//!
//! Wire-facing types (`Message`, `TodoItem`, file payloads) serialize in
//! the agent's schema; store-facing types (`ChatThread`, `ThreadSummary`)
//! use UTC timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::Display;

/// Role in the conversation; governs rendering and merge rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
    Tool,
}

/// A tool invocation carried on an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: Some(generate_id("msg")),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
            timestamp: Some(now_millis()),
        }
    }

    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// Identity is the id: an id that reappears is an update, not a new item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl TodoItem {
    pub fn in_progress(id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            content: content.into(),
            status: TodoStatus::InProgress,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Code,
    Markdown,
    Text,
    Json,
    Other,
}

/// A generated file, with type and language derived from its path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileItem {
    pub path: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FileItem {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let (file_type, language) = detect_file_type(&path);
        Self {
            path,
            content: content.into(),
            file_type,
            language,
        }
    }
}

fn detect_file_type(path: &str) -> (FileType, Option<String>) {
    let extension = path.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "md" | "markdown" => (FileType::Markdown, None),
        "json" => (FileType::Json, Some("json".to_string())),
        "txt" => (FileType::Text, None),
        "rs" => (FileType::Code, Some("rust".to_string())),
        "py" => (FileType::Code, Some("python".to_string())),
        "js" => (FileType::Code, Some("javascript".to_string())),
        "ts" => (FileType::Code, Some("typescript".to_string())),
        "sh" => (FileType::Code, Some("bash".to_string())),
        "toml" | "yaml" | "yml" | "html" | "css" | "sql" => {
            (FileType::Code, Some(extension))
        }
        _ => (FileType::Other, None),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Thinking,
    Acting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStep {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// A delegated unit of work, observable only through paired start/complete
/// signals keyed by the originating tool-call id. Never deleted, only
/// terminalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubAgentTask {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub steps: Vec<TaskStep>,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

impl SubAgentTask {
    pub fn started(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            name: name.into(),
            status: TaskStatus::Thinking,
            steps: vec![TaskStep {
                id: generate_id("step"),
                description: description.into(),
                status: StepStatus::Running,
                timestamp: now,
                output: None,
            }],
            progress: 0,
            start_time: Some(now),
            end_time: None,
        }
    }

    /// Transition to completed, stamping an end time and attaching the
    /// result to every step.
    pub fn complete(&mut self, result: &str) {
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.end_time = Some(now_millis());
        for step in &mut self.steps {
            step.status = StepStatus::Completed;
            step.output = Some(result.to_string());
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Canonical per-thread state, exclusively owned by the session reconciler
/// while a session is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ChatThread {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            todos: Vec::new(),
            files: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            title: None,
        }
    }

    /// Title shown in the thread index: the first human message, truncated.
    pub fn derived_title(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == Role::Human && m.has_text())
            .map(|m| truncate_title(&m.content))
    }

    /// Typed view of the generated files, with type and language derived
    /// from each path.
    pub fn file_items(&self) -> Vec<FileItem> {
        self.files
            .iter()
            .map(|(path, content)| FileItem::new(path.clone(), content.clone()))
            .collect()
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            title: self
                .title
                .clone()
                .or_else(|| self.derived_title())
                .unwrap_or_else(|| "Untitled conversation".to_string()),
            message_count: self.messages.len() as u32,
            updated_at: self.updated_at,
        }
    }
}

const TITLE_MAX_CHARS: usize = 60;

fn truncate_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}…", truncated.trim_end())
}

/// Index entry for a stored thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    pub message_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot returned by the agent's thread-state endpoint. An unknown
/// thread yields an empty snapshot, never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThreadStateSnapshot {
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Unique id with a short type prefix.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::now_v7())
}

pub fn generate_thread_id() -> String {
    generate_id("thread")
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_format_round_trips() {
        let json = serde_json::json!({
            "type": "ai",
            "content": "hello",
            "id": "msg_1",
            "tool_calls": [{"id": "tc_1", "name": "task", "args": {"description": "dig"}}]
        });
        let message: Message = serde_json::from_value(json).unwrap();
        assert_eq!(message.role, Role::Ai);
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "task");

        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["type"], "ai");
    }

    #[test]
    fn todo_status_uses_snake_case() {
        let todo = TodoItem::in_progress("tc_1", "research");
        let value = serde_json::to_value(&todo).unwrap();
        assert_eq!(value["status"], "in_progress");
        assert!(value["createdAt"].is_i64());
    }

    #[test]
    fn file_type_is_derived_from_extension() {
        assert_eq!(FileItem::new("plan.md", "").file_type, FileType::Markdown);
        assert_eq!(
            FileItem::new("src/main.rs", "").language.as_deref(),
            Some("rust")
        );
        assert_eq!(FileItem::new("notes", "").file_type, FileType::Other);
    }

    #[test]
    fn file_items_are_typed_views_of_the_file_set() {
        let mut thread = ChatThread::new("thread_1");
        thread.files.insert("plan.md".to_string(), "# Plan".to_string());
        thread.files.insert("main.rs".to_string(), "fn main() {}".to_string());

        let items = thread.file_items();
        assert_eq!(items.len(), 2);
        let plan = items.iter().find(|f| f.path == "plan.md").unwrap();
        assert_eq!(plan.file_type, FileType::Markdown);
        assert_eq!(plan.content, "# Plan");
        let code = items.iter().find(|f| f.path == "main.rs").unwrap();
        assert_eq!(code.language.as_deref(), Some("rust"));
    }

    #[test]
    fn derived_title_truncates_first_human_message() {
        let mut thread = ChatThread::new("thread_1");
        thread.messages.push(Message::system("notice"));
        thread.messages.push(Message::human("a".repeat(100)));
        let title = thread.derived_title().unwrap();
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn task_completion_terminalizes_steps() {
        let mut task = SubAgentTask::started("tc_a", "researcher", "dig into it");
        assert_eq!(task.status, TaskStatus::Thinking);
        assert_eq!(task.steps[0].status, StepStatus::Running);

        task.complete("done");
        assert!(task.is_terminal());
        assert_eq!(task.progress, 100);
        assert_eq!(task.steps[0].output.as_deref(), Some("done"));
        assert!(task.end_time.is_some());
    }
}
