//! Execution events emitted by the workflow server.
//!
//! The wire form is `{"event_type": ..., "node_id": ..., "data": ...}` where
//! the shape of `data` depends on the event type. Decoding goes through
//! [`RawEvent`] so the event type is a closed enum and each payload is
//! checked against the shape its variant expects.

use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator carried in the `event_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeStart,
    NodeOutput,
    NodeComplete,
    NodeError,
    WorkflowComplete,
}

impl EventType {
    /// Wire name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::NodeStart => "node_start",
            EventType::NodeOutput => "node_output",
            EventType::NodeComplete => "node_complete",
            EventType::NodeError => "node_error",
            EventType::WorkflowComplete => "workflow_complete",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage reported for a single node execution.
///
/// Accepts both the long field names and the short `input`/`output`/`total`
/// aliases some servers emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, alias = "input")]
    pub input_tokens: u64,
    #[serde(default, alias = "output")]
    pub output_tokens: u64,
    #[serde(default, alias = "total")]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_tokens == 0
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
    }
}

/// Typed payload of an execution event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Node began executing. `input` is the resolved task text, when sent.
    NodeStart { input: Option<String> },
    /// Incremental output chunk from a running node.
    NodeOutput { chunk: String },
    /// Node finished successfully.
    NodeComplete {
        /// Elapsed execution time in seconds, as measured by the server.
        elapsed_time: Option<f64>,
        token_usage: Option<TokenUsage>,
    },
    /// Node failed.
    NodeError { error: String },
    /// Whole workflow finished.
    WorkflowComplete,
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::NodeStart { .. } => EventType::NodeStart,
            EventPayload::NodeOutput { .. } => EventType::NodeOutput,
            EventPayload::NodeComplete { .. } => EventType::NodeComplete,
            EventPayload::NodeError { .. } => EventType::NodeError,
            EventPayload::WorkflowComplete => EventType::WorkflowComplete,
        }
    }
}

/// A decoded execution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct ExecutionEvent {
    /// Node this event belongs to. Empty for workflow-scoped events.
    pub node_id: String,
    pub payload: EventPayload,
}

impl ExecutionEvent {
    pub fn new(node_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            node_id: node_id.into(),
            payload,
        }
    }

    pub fn node_start(node_id: impl Into<String>) -> Self {
        Self::new(node_id, EventPayload::NodeStart { input: None })
    }

    pub fn node_output(node_id: impl Into<String>, chunk: impl Into<String>) -> Self {
        Self::new(
            node_id,
            EventPayload::NodeOutput {
                chunk: chunk.into(),
            },
        )
    }

    pub fn node_complete(node_id: impl Into<String>, token_usage: Option<TokenUsage>) -> Self {
        Self::new(
            node_id,
            EventPayload::NodeComplete {
                elapsed_time: None,
                token_usage,
            },
        )
    }

    pub fn node_error(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(
            node_id,
            EventPayload::NodeError {
                error: error.into(),
            },
        )
    }

    pub fn workflow_complete() -> Self {
        Self::new(String::new(), EventPayload::WorkflowComplete)
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Wire representation of an event, before payload validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Payload shape did not match what the event type requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEvent(pub String);

impl fmt::Display for InvalidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidEvent {}

#[derive(Deserialize)]
struct CompleteData {
    #[serde(default, alias = "elapsed")]
    elapsed_time: Option<f64>,
    #[serde(default)]
    token_usage: Option<TokenUsage>,
}

impl TryFrom<RawEvent> for ExecutionEvent {
    type Error = InvalidEvent;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let node_id = raw.node_id.unwrap_or_default();
        if node_id.is_empty() && raw.event_type != EventType::WorkflowComplete {
            return Err(InvalidEvent(format!(
                "{} event is missing node_id",
                raw.event_type
            )));
        }

        let payload = match raw.event_type {
            EventType::NodeStart => EventPayload::NodeStart {
                input: match &raw.data {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => string_field(map, &["input", "task"]),
                    other => return Err(shape_error(raw.event_type, other)),
                },
            },
            EventType::NodeOutput => {
                let chunk = match &raw.data {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => string_field(map, &["output", "chunk"]),
                    _ => None,
                };
                let chunk = chunk.ok_or_else(|| shape_error(raw.event_type, &raw.data))?;
                EventPayload::NodeOutput { chunk }
            }
            EventType::NodeComplete => match raw.data {
                Value::Null => EventPayload::NodeComplete {
                    elapsed_time: None,
                    token_usage: None,
                },
                data @ Value::Object(_) => {
                    let parsed: CompleteData = serde_json::from_value(data).map_err(|err| {
                        InvalidEvent(format!("invalid node_complete data: {err}"))
                    })?;
                    EventPayload::NodeComplete {
                        elapsed_time: parsed.elapsed_time,
                        token_usage: parsed.token_usage,
                    }
                }
                other => return Err(shape_error(raw.event_type, &other)),
            },
            EventType::NodeError => {
                let error = match &raw.data {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => string_field(map, &["error", "message"]),
                    _ => None,
                };
                let error = error.ok_or_else(|| shape_error(raw.event_type, &raw.data))?;
                EventPayload::NodeError { error }
            }
            EventType::WorkflowComplete => EventPayload::WorkflowComplete,
        };

        Ok(ExecutionEvent { node_id, payload })
    }
}

impl From<ExecutionEvent> for RawEvent {
    fn from(event: ExecutionEvent) -> Self {
        let event_type = event.event_type();
        let data = match event.payload {
            EventPayload::NodeStart { input: None } | EventPayload::WorkflowComplete => {
                Value::Null
            }
            EventPayload::NodeStart { input: Some(input) } => {
                let mut map = Map::new();
                map.insert("input".to_string(), Value::String(input));
                Value::Object(map)
            }
            EventPayload::NodeOutput { chunk } => Value::String(chunk),
            EventPayload::NodeComplete {
                elapsed_time,
                token_usage,
            } => {
                let mut map = Map::new();
                if let Some(elapsed) = elapsed_time {
                    map.insert("elapsed_time".to_string(), Value::from(elapsed));
                }
                if let Some(usage) = token_usage
                    && let Ok(value) = serde_json::to_value(usage)
                {
                    map.insert("token_usage".to_string(), value);
                }
                Value::Object(map)
            }
            EventPayload::NodeError { error } => Value::String(error),
        };

        RawEvent {
            event_type,
            node_id: (!event.node_id.is_empty()).then_some(event.node_id),
            data,
        }
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn shape_error(event_type: EventType, data: &Value) -> InvalidEvent {
    let found = match data {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object without the expected field",
    };
    InvalidEvent(format!("unexpected data for {event_type}: found {found}"))
}
