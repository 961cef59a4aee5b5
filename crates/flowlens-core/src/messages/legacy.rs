//! Object-printer ("repr") payloads.
//!
//! Some agent runtimes log messages with a generic object printer instead of
//! JSON, e.g. `UserMessage(content=[TextBlock(text='hi')])`. Only the two
//! shapes that carry user-visible text are recognized.

use flowlens_types::LogMessage;

const USER_MESSAGE_TAG: &str = "UserMessage(";
const TOOL_RESULT_TAG: &str = "ToolResultBlock(";
const TEXT_BLOCK_TAG: &str = "TextBlock(";

/// Parses a repr payload, or returns `None` when `text` is not one.
pub fn parse(text: &str) -> Option<LogMessage> {
    let body = text.trim_start().strip_prefix(USER_MESSAGE_TAG)?;

    if let Some(content) = field_after(body, TOOL_RESULT_TAG, "content=") {
        return Some(LogMessage::ToolResult { content });
    }
    if let Some(content) = field_after(body, TEXT_BLOCK_TAG, "text=") {
        return Some(LogMessage::UserMessage { content });
    }
    None
}

/// Finds `tag`, then the first `field` after it, and reads the quoted literal
/// that follows.
fn field_after(body: &str, tag: &str, field: &str) -> Option<String> {
    let block = &body[body.find(tag)? + tag.len()..];
    let value = &block[block.find(field)? + field.len()..];
    read_quoted(value)
}

/// Reads a `'...'` or `"..."` literal at the start of `input`, decoding
/// escapes. Returns `None` when the literal is missing or unterminated.
pub fn read_quoted(input: &str) -> Option<String> {
    let mut chars = input.chars();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;

    let mut out = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            return Some(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => push_code_point(&mut out, &mut chars, 2, 'x'),
            'u' => push_code_point(&mut out, &mut chars, 4, 'u'),
            'U' => push_code_point(&mut out, &mut chars, 8, 'U'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    None
}

/// Decodes a fixed-width hex escape; keeps it literally if it is not valid.
fn push_code_point(out: &mut String, chars: &mut std::str::Chars<'_>, width: usize, marker: char) {
    let lookahead = chars.clone();
    let digits: String = lookahead.take(width).collect();
    let decoded = (digits.len() == width && digits.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| u32::from_str_radix(&digits, 16).ok())
        .flatten()
        .and_then(char::from_u32);

    match decoded {
        Some(c) => {
            out.push(c);
            for _ in 0..width {
                chars.next();
            }
        }
        None => {
            out.push('\\');
            out.push(marker);
        }
    }
}
