//! Classified log messages and the intermediate content blocks they come from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kinds of [`LogMessage`], for filtering and styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    AssistantMessage,
    ToolUse,
    ToolResult,
    Thinking,
    Text,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::UserMessage => "user_message",
            MessageKind::AssistantMessage => "assistant_message",
            MessageKind::ToolUse => "tool_use",
            MessageKind::ToolResult => "tool_result",
            MessageKind::Thinking => "thinking",
            MessageKind::Text => "text",
        }
    }
}

/// A tool invocation extracted from an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub tool_name: String,
    pub input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// A human-readable unit extracted from a node's raw output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogMessage {
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
    },
    ToolUse {
        content: String,
        #[serde(rename = "toolUse")]
        tool_use: ToolUse,
    },
    ToolResult {
        content: String,
    },
    Thinking {
        content: String,
    },
    /// Fallback for anything that is not a recognized structured message.
    Text {
        content: String,
    },
}

impl LogMessage {
    pub fn text(content: impl Into<String>) -> Self {
        LogMessage::Text {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            LogMessage::UserMessage { .. } => MessageKind::UserMessage,
            LogMessage::AssistantMessage { .. } => MessageKind::AssistantMessage,
            LogMessage::ToolUse { .. } => MessageKind::ToolUse,
            LogMessage::ToolResult { .. } => MessageKind::ToolResult,
            LogMessage::Thinking { .. } => MessageKind::Thinking,
            LogMessage::Text { .. } => MessageKind::Text,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            LogMessage::UserMessage { content }
            | LogMessage::AssistantMessage { content }
            | LogMessage::ToolUse { content, .. }
            | LogMessage::ToolResult { content }
            | LogMessage::Thinking { content }
            | LogMessage::Text { content } => content,
        }
    }

    pub fn tool_use(&self) -> Option<&ToolUse> {
        match self {
            LogMessage::ToolUse { tool_use, .. } => Some(tool_use),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    Json,
}

/// Literal span of a payload, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Text,
            text: text.into(),
        }
    }

    pub fn json(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Json,
            text: text.into(),
        }
    }
}
