//! Execution stream consumption: frames, events, transport, pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod event;
pub mod frame;
pub mod pipeline;
pub mod transport;

pub use event::{classify, encode_frame};
pub use frame::{COMPLETION_SENTINEL, ERROR_SENTINEL_PREFIX, Frame, FrameDecoder, FrameStream};
pub use pipeline::{StreamOutcome, StreamSummary, consume, consume_into_handle};
pub use transport::{ByteStream, RunRequest, open_stream};

/// Categories of stream errors.
///
/// `HttpStatus`, `Timeout` and `Transport` are fatal to the current
/// consumption. `Protocol` covers a single malformed frame or event and is
/// recovered by dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection or request timeout
    Timeout,
    /// Byte stream failed mid-read
    Transport,
    /// Malformed frame or event payload
    Protocol,
}

impl StreamErrorKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, StreamErrorKind::Protocol)
    }
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorKind::HttpStatus => write!(f, "http_status"),
            StreamErrorKind::Timeout => write!(f, "timeout"),
            StreamErrorKind::Transport => write!(f, "transport"),
            StreamErrorKind::Protocol => write!(f, "protocol"),
        }
    }
}

/// Structured stream error with kind and details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    /// Error category
    pub kind: StreamErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Protocol, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Timeout, message)
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Creates an HTTP status error, pulling `error.message` out of a JSON
    /// body when there is one.
    pub fn http_status(status: u16, body: &str) -> Self {
        if body.is_empty() {
            return Self::new(StreamErrorKind::HttpStatus, format!("HTTP {status}"));
        }

        let detail_message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
            json.get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .or_else(|| json.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        let message = match detail_message {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };
        Self::new(StreamErrorKind::HttpStatus, message).with_details(body)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StreamError {}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
