//! Splits mixed payloads into text and role-JSON spans.

use std::sync::LazyLock;

use flowlens_types::ContentBlock;
use regex::Regex;

static ROLE_OBJECT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"role"\s*:\s*"(?:assistant|user|system)""#)
        .expect("role object pattern is a valid regex")
});

/// Splits `text` into an ordered sequence of blocks.
///
/// Concatenating the block texts reproduces `text` exactly. An embedded
/// object that never closes is left inside the trailing text block.
pub fn split_content_blocks(text: &str) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    let mut pending = 0;
    let mut search_from = 0;

    while let Some(found) = ROLE_OBJECT_START.find_at(text, search_from) {
        let start = found.start();
        let Some(end) = object_end(text, start) else {
            break;
        };
        if start > pending {
            blocks.push(ContentBlock::text(&text[pending..start]));
        }
        blocks.push(ContentBlock::json(&text[start..end]));
        pending = end;
        search_from = end;
    }

    if pending < text.len() {
        blocks.push(ContentBlock::text(&text[pending..]));
    }
    blocks
}

/// Byte offset just past the `}` that closes the object opening at `start`.
/// String literals are opaque, including escaped quotes inside them.
fn object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
