//! Event classification: frame payload -> typed execution event.

use flowlens_types::ExecutionEvent;

use super::{StreamError, StreamResult};

const MAX_DETAIL_LEN: usize = 512;

/// Decodes the joined data of a non-sentinel frame into an event.
///
/// # Errors
/// Returns a `Protocol` error when the payload is not valid JSON or does not
/// have the `{event_type, node_id, data}` shape. Callers drop the frame and
/// keep reading.
pub fn classify(payload: &str) -> StreamResult<ExecutionEvent> {
    serde_json::from_str::<ExecutionEvent>(payload.trim()).map_err(|err| {
        StreamError::protocol(format!("Failed to parse event: {err}"))
            .with_details(truncate(payload, MAX_DETAIL_LEN))
    })
}

/// Encodes an event as one delimited wire frame.
///
/// # Errors
/// Returns an error if the event cannot be serialized.
pub fn encode_frame(event: &ExecutionEvent) -> serde_json::Result<String> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {json}\n\n"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
