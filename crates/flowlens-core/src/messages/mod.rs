//! Log message classification.
//!
//! Node output is free text that may contain structured agent messages in
//! one of two incompatible formats: object-printer repr strings and
//! role-tagged JSON, standalone or embedded in prose. Classification never
//! fails; anything unrecognized is returned as [`LogMessage::Text`].

use flowlens_types::{BlockKind, LogMessage};
use serde_json::Value;

mod blocks;
pub mod json;
pub mod legacy;

pub use blocks::split_content_blocks;

/// Classifies a whole payload as a single message.
pub fn parse_log_message(text: &str) -> LogMessage {
    if let Some(message) = legacy::parse(text) {
        return message;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => json::classify(&value),
        Err(_) => LogMessage::text(text),
    }
}

/// Classifies a payload that may mix prose with embedded role objects.
///
/// Whitespace-only text spans are skipped. A payload with no embedded role
/// object is classified as a whole by [`parse_log_message`].
pub fn parse_log_messages(text: &str) -> Vec<LogMessage> {
    if let Some(message) = legacy::parse(text) {
        return vec![message];
    }

    let blocks = split_content_blocks(text);
    if blocks.iter().all(|block| block.kind == BlockKind::Text) {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![parse_log_message(text)];
    }

    blocks
        .into_iter()
        .filter_map(|block| match block.kind {
            BlockKind::Json => Some(match serde_json::from_str::<Value>(&block.text) {
                Ok(value) => json::classify(&value),
                Err(_) => LogMessage::text(block.text),
            }),
            BlockKind::Text if block.text.trim().is_empty() => None,
            BlockKind::Text => Some(LogMessage::text(block.text)),
        })
        .collect()
}
