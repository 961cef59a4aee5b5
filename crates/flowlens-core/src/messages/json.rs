//! Role-tagged JSON payloads.

use flowlens_types::{LogMessage, ToolUse};
use serde_json::{Map, Value};

/// Classifies a decoded JSON payload. Never fails: anything unrecognized
/// becomes pretty-printed text.
pub fn classify(value: &Value) -> LogMessage {
    let recognized = match value.get("role").and_then(Value::as_str) {
        Some("assistant") => assistant(value.get("content")),
        Some("user") => user(value.get("content")),
        Some("system") => system(value.get("content")),
        _ if value.get("type").and_then(Value::as_str) == Some("tool_result") => {
            Some(tool_result(value.get("content")))
        }
        _ => None,
    };
    recognized.unwrap_or_else(|| LogMessage::text(pretty(value)))
}

fn assistant(content: Option<&Value>) -> Option<LogMessage> {
    match content? {
        Value::String(text) => Some(LogMessage::AssistantMessage {
            content: text.clone(),
        }),
        Value::Array(blocks) => blocks.iter().find_map(assistant_block),
        _ => None,
    }
}

fn assistant_block(block: &Value) -> Option<LogMessage> {
    match block_type(block)? {
        "text" => Some(LogMessage::AssistantMessage {
            content: str_field(block, "text")?.to_string(),
        }),
        "thinking" => {
            let thinking = str_field(block, "thinking").or_else(|| str_field(block, "text"))?;
            Some(LogMessage::Thinking {
                content: thinking.to_string(),
            })
        }
        "tool_use" => {
            let name = str_field(block, "name")?;
            let input = match block.get("input") {
                Some(Value::Object(map)) => map.clone(),
                Some(Value::Null) | None => Map::new(),
                Some(other) => {
                    let mut wrapped = Map::new();
                    wrapped.insert("value".to_string(), other.clone());
                    wrapped
                }
            };
            Some(LogMessage::ToolUse {
                content: name.to_string(),
                tool_use: ToolUse {
                    tool_name: name.to_string(),
                    input,
                    output: None,
                },
            })
        }
        _ => None,
    }
}

fn user(content: Option<&Value>) -> Option<LogMessage> {
    match content? {
        Value::String(text) => Some(LogMessage::UserMessage {
            content: text.clone(),
        }),
        Value::Array(blocks) => {
            let text = blocks
                .iter()
                .filter(|block| block_type(block) == Some("text"))
                .find_map(|block| str_field(block, "text"));
            if let Some(text) = text {
                return Some(LogMessage::UserMessage {
                    content: text.to_string(),
                });
            }
            blocks
                .iter()
                .find(|block| block_type(block) == Some("tool_result"))
                .map(|block| tool_result(block.get("content")))
        }
        _ => None,
    }
}

fn system(content: Option<&Value>) -> Option<LogMessage> {
    match content? {
        Value::String(text) => Some(LogMessage::text(text.clone())),
        Value::Array(blocks) => Some(LogMessage::text(join_text_blocks(blocks))),
        _ => None,
    }
}

fn tool_result(content: Option<&Value>) -> LogMessage {
    let content = match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => join_text_blocks(blocks),
        Some(Value::Null) | None => String::new(),
        Some(other) => pretty(other),
    };
    LogMessage::ToolResult { content }
}

fn join_text_blocks(blocks: &[Value]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Value::String(text) => Some(text.as_str()),
            _ if block_type(block) == Some("text") => str_field(block, "text"),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn block_type(block: &Value) -> Option<&str> {
    str_field(block, "type")
}

fn str_field<'a>(block: &'a Value, key: &str) -> Option<&'a str> {
    block.get(key).and_then(Value::as_str)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
