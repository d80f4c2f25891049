//! Session reconciler: the single owner of canonical thread state.
//!
//! All mutation flows through [`SessionReconciler::apply`], in delta order.
//! Nothing else writes the thread while a turn is live, so ordering
//! invariants (todos only replaced wholesale, messages append-only by id)
//! hold by construction.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{AgentClient, ApiError, SseEventStream};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::session::delta::AgentDelta;
use crate::session::dispatch::{TASK_TOOL_NAME, dispatch_record};
use crate::session::reveal::{RevealScheduler, RevealState};
use crate::session::thread::{
    ChatThread, Message, Role, SubAgentTask, TodoItem, TodoStatus, generate_thread_id, now_millis,
};
use crate::store::{SaveScheduler, ThreadStore};
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;

pub struct SessionReconciler {
    client: AgentClient,
    saves: SaveScheduler,
    reveal: RevealScheduler,
    thread: ChatThread,
    tasks: Vec<SubAgentTask>,
    streaming: bool,
    last_error: Option<String>,
    cancel_token: CancellationToken,
}

impl SessionReconciler {
    pub fn new(client: AgentClient, store: Arc<dyn ThreadStore>, config: &AgentConfig) -> Self {
        Self {
            client,
            saves: SaveScheduler::new(store, config.debounce_window()),
            reveal: RevealScheduler::new(config.reveal_tick(), config.reveal_step_chars),
            thread: ChatThread::new(generate_thread_id()),
            tasks: Vec::new(),
            streaming: false,
            last_error: None,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn thread(&self) -> &ChatThread {
        &self.thread
    }

    pub fn thread_id(&self) -> &str {
        &self.thread.id
    }

    pub fn tasks(&self) -> &[SubAgentTask] {
        &self.tasks
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Token guarding the current turn. Cancelling it mid-turn abandons the
    /// stream without committing the in-flight assistant text.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Observe the progressive reveal of the in-flight assistant text.
    pub fn reveal_updates(&self) -> watch::Receiver<RevealState> {
        self.reveal.subscribe()
    }

    pub fn revealed(&self) -> RevealState {
        self.reveal.current()
    }

    /// Switch to a stored thread, or a fresh one under that id if none is
    /// stored. Rejected while a turn is live.
    pub async fn resume(&mut self, thread_id: &str) -> Result<()> {
        if self.streaming {
            return Err(Error::InvalidOperation(
                "cannot switch threads while streaming".to_string(),
            ));
        }
        self.thread = match self.saves.store().get_thread(thread_id).await? {
            Some(thread) => thread,
            None => ChatThread::new(thread_id),
        };
        self.tasks.clear();
        self.last_error = None;
        self.reveal.reset();
        Ok(())
    }

    /// Abort the in-flight turn, if any: the stream read is abandoned, the
    /// revealed prefix is discarded without a terminal commit, and any
    /// debounced save is dropped. Never an error.
    pub fn cancel(&mut self) {
        self.cancel_token.cancel();
        self.finish_cancelled();
    }

    /// Drop the current thread and start a fresh one under a new id.
    pub fn reset(&mut self) {
        self.cancel();
        self.reveal.reset();
        self.thread = ChatThread::new(generate_thread_id());
        self.tasks.clear();
        self.last_error = None;
        self.cancel_token = CancellationToken::new();
        self.saves.schedule_save(&self.thread);
    }

    /// Send a user message and drive the resulting turn to completion.
    ///
    /// A no-op while a turn is already live. The user message is persisted
    /// before the request goes out, so it survives even if the turn fails.
    pub async fn submit_user_message(&mut self, text: &str) -> Result<()> {
        if self.streaming {
            debug!(target: "session::reconciler", "turn already live; ignoring submit");
            return Ok(());
        }
        if text.trim().is_empty() {
            return Ok(());
        }

        self.append_message(Message::human(text));
        self.touch();
        self.saves.flush_now(&self.thread).await;

        let token = self.start_turn();
        let stream = match self
            .client
            .stream(&self.thread.id, &self.thread.messages, token)
            .await
        {
            Ok(stream) => stream,
            Err(ApiError::Cancelled) => {
                self.finish_cancelled();
                return Ok(());
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                self.streaming = false;
                return Err(e.into());
            }
        };

        self.run_stream(stream).await;
        Ok(())
    }

    /// Arm a fresh turn: new cancellation token, cleared error, streaming on.
    pub(crate) fn start_turn(&mut self) -> CancellationToken {
        self.cancel_token = CancellationToken::new();
        self.last_error = None;
        self.streaming = true;
        self.reveal.reset();
        self.cancel_token.clone()
    }

    /// Consume a framed event stream, applying its deltas in order.
    pub(crate) async fn run_stream(&mut self, mut stream: SseEventStream) {
        let mut ended = false;
        let mut transport_failed = false;

        'records: while let Some(item) = stream.next().await {
            if self.cancel_token.is_cancelled() {
                break;
            }
            match item {
                Ok(record) => {
                    for delta in dispatch_record(&record) {
                        let is_end = delta.is_end();
                        self.apply(delta).await;
                        if is_end {
                            ended = true;
                            break 'records;
                        }
                    }
                }
                Err(e) => {
                    self.apply(AgentDelta::Error(e.to_string())).await;
                    transport_failed = true;
                    break;
                }
            }
        }

        if self.cancel_token.is_cancelled() {
            self.finish_cancelled();
        } else if !ended && !transport_failed {
            // A cleanly finished body without an explicit end record still
            // commits, even when some payloads were malformed. Only a
            // broken transport leaves the turn uncommitted.
            self.apply(AgentDelta::End).await;
        }
    }

    /// Apply one delta to canonical state. Deltas arriving after the turn's
    /// token is cancelled are stale and ignored.
    pub(crate) async fn apply(&mut self, delta: AgentDelta) {
        if self.cancel_token.is_cancelled() {
            debug!(target: "session::reconciler", "dropping stale delta after cancel");
            return;
        }

        match delta {
            AgentDelta::Messages(messages) => self.apply_messages(&messages),
            AgentDelta::Todos(todos) => {
                self.thread.todos = todos;
                self.touch();
                self.saves.schedule_save(&self.thread);
            }
            AgentDelta::Files(files) => {
                self.thread.files = files;
                self.touch();
                self.saves.schedule_save(&self.thread);
            }
            AgentDelta::Metadata(value) => {
                debug!(target: "session::reconciler", metadata = %value, "transport metadata");
            }
            AgentDelta::TaskStarted {
                id,
                name,
                description,
            } => self.apply_task_started(id, name, description),
            AgentDelta::TaskCompleted { id, result } => self.apply_task_completed(&id, &result),
            AgentDelta::Error(message) => {
                warn!(target: "session::reconciler", error = %message, "stream error");
                self.last_error = Some(message);
                self.streaming = false;
            }
            AgentDelta::End => self.apply_end().await,
        }
    }

    /// The reveal target is the most recent assistant message with text,
    /// falling back to the most recent task result. A changed target
    /// restarts the reveal from an empty prefix.
    fn apply_messages(&mut self, messages: &[Message]) {
        let target = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Ai && m.has_text())
            .or_else(|| {
                messages.iter().rev().find(|m| {
                    m.role == Role::Tool
                        && m.name.as_deref() == Some(TASK_TOOL_NAME)
                        && m.has_text()
                })
            });

        if let Some(message) = target {
            if message.content != self.reveal.target() {
                self.reveal.set_target(message.content.clone());
            }
        }
    }

    fn apply_task_started(&mut self, id: String, name: String, description: String) {
        if self.tasks.iter().any(|t| t.id == id) {
            debug!(target: "session::reconciler", task_id = %id, "task already started");
            return;
        }
        self.tasks
            .push(SubAgentTask::started(&id, &name, &description));
        if !self.thread.todos.iter().any(|t| t.id == id) {
            self.thread
                .todos
                .push(TodoItem::in_progress(&id, &description));
        }
        self.append_message(Message::system(format!(
            "🤖 **{name}** is working on: {description}"
        )));
        self.touch();
        self.saves.schedule_save(&self.thread);
    }

    fn apply_task_completed(&mut self, id: &str, result: &str) {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(target: "session::reconciler", task_id = %id, "completion for unknown task");
            return;
        };
        task.complete(result);
        let name = task.name.clone();

        if let Some(todo) = self.thread.todos.iter_mut().find(|t| t.id == id) {
            todo.status = TodoStatus::Completed;
            todo.updated_at = Some(now_millis());
        }
        self.append_message(Message::system(format!("✅ **{name}** completed task")));
        self.touch();
        self.saves.schedule_save(&self.thread);
    }

    /// Terminal commit: the full reveal target becomes a durable assistant
    /// message, the reveal returns to idle, and the snapshot is flushed
    /// past the debounce window.
    async fn apply_end(&mut self) {
        let target = self.reveal.target().to_string();
        if !target.is_empty() {
            self.append_message(Message::assistant(target));
        }
        self.reveal.reset();
        self.streaming = false;
        self.touch();
        self.saves.flush_now(&self.thread).await;
    }

    fn finish_cancelled(&mut self) {
        debug!(target: "session::reconciler", thread_id = %self.thread.id, "turn cancelled");
        self.reveal.cancel();
        self.saves.cancel_pending();
        self.streaming = false;
    }

    /// Append, deduplicating by message id.
    pub(crate) fn append_message(&mut self, message: Message) {
        if let Some(id) = message.id.as_deref() {
            if self
                .thread
                .messages
                .iter()
                .any(|m| m.id.as_deref() == Some(id))
            {
                debug!(target: "session::reconciler", message_id = id, "duplicate message dropped");
                return;
            }
        }
        self.thread.messages.push(message);
    }

    fn touch(&mut self) {
        self.thread.updated_at = Utc::now();
        if self.thread.title.is_none() {
            self.thread.title = self.thread.derived_title();
        }
    }
}
