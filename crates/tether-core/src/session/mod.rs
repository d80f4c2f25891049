//! Session layer: dispatching framed records into typed deltas and
//! reconciling them into canonical thread state.

pub mod delta;
pub mod dispatch;
pub mod reconciler;
pub mod reveal;
pub mod thread;


pub use delta::AgentDelta;
pub use dispatch::dispatch_record;
pub use reconciler::SessionReconciler;
pub use reveal::{RevealPhase, RevealScheduler, RevealState};
pub use thread::{
    ChatThread, FileItem, FileType, Message, Role, SubAgentTask, TaskStatus, ThreadStateSnapshot,
    ThreadSummary, TodoItem, TodoStatus,
};
