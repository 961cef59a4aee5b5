//! Shared data model for flowlens (events, node state, log messages).

pub mod event;
pub mod message;
pub mod status;

pub use event::{EventPayload, EventType, ExecutionEvent, TokenUsage};
pub use message::{BlockKind, ContentBlock, LogMessage, MessageKind, ToolUse};
pub use status::{NodeExecutionMeta, NodeStatus};
