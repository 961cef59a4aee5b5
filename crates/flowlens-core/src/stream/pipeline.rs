//! Drives frames through the classifier into a store.
//!
//! One reader per run. Events are applied strictly in arrival order; a
//! malformed or rejected event is dropped and counted, anything fatal is
//! returned to the caller. Cancellation is raced against every read.

use flowlens_types::ExecutionEvent;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::StreamResult;
use super::event::classify;
use super::frame::Frame;
use crate::store::{ExecutionStore, StoreAction, StoreError, StoreHandle};

/// How consumption ended, when it ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Completion sentinel received.
    Completed,
    /// Error sentinel received; carries the server's message.
    ServerError(String),
    /// Cancellation token fired, or the store went away.
    Cancelled,
    /// Transport closed without a sentinel.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub outcome: StreamOutcome,
    /// Events applied to the store.
    pub events: usize,
    /// Frames or events dropped as malformed or rejected.
    pub dropped: usize,
}

trait EventSink {
    async fn apply_event(&mut self, event: ExecutionEvent) -> Result<(), StoreError>;
    async fn end_stream(&mut self);
}

impl EventSink for ExecutionStore {
    async fn apply_event(&mut self, event: ExecutionEvent) -> Result<(), StoreError> {
        self.apply(StoreAction::Event(event))
    }

    async fn end_stream(&mut self) {
        let _ = self.apply(StoreAction::StreamEnded);
    }
}

impl EventSink for StoreHandle {
    async fn apply_event(&mut self, event: ExecutionEvent) -> Result<(), StoreError> {
        self.apply(StoreAction::Event(event)).await
    }

    async fn end_stream(&mut self) {
        let _ = self.apply(StoreAction::StreamEnded).await;
    }
}

/// Consumes `frames` into a store owned by the caller.
///
/// # Errors
/// Returns the first fatal [`super::StreamError`] (`HttpStatus`, `Timeout`,
/// `Transport`). The store keeps whatever state it reached.
pub async fn consume<S>(
    frames: S,
    store: &mut ExecutionStore,
    cancel: &CancellationToken,
) -> StreamResult<StreamSummary>
where
    S: Stream<Item = StreamResult<Frame>> + Unpin,
{
    drive(frames, store, cancel).await
}

/// Consumes `frames` into a store task, sharing its queue with other producers.
///
/// A store task that stops mid-stream ends consumption as `Cancelled`.
///
/// # Errors
/// See [`consume`].
pub async fn consume_into_handle<S>(
    frames: S,
    handle: &StoreHandle,
    cancel: &CancellationToken,
) -> StreamResult<StreamSummary>
where
    S: Stream<Item = StreamResult<Frame>> + Unpin,
{
    let mut handle = handle.clone();
    drive(frames, &mut handle, cancel).await
}

async fn drive<S, K>(
    mut frames: S,
    sink: &mut K,
    cancel: &CancellationToken,
) -> StreamResult<StreamSummary>
where
    S: Stream<Item = StreamResult<Frame>> + Unpin,
    K: EventSink,
{
    let mut events = 0;
    let mut dropped = 0;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break StreamOutcome::Cancelled,
            next = frames.next() => next,
        };

        let frame = match next {
            None => break StreamOutcome::Closed,
            Some(Ok(frame)) => frame,
            Some(Err(err)) if !err.kind.is_fatal() => {
                warn!(error = %err, "dropping malformed frame");
                dropped += 1;
                continue;
            }
            Some(Err(err)) => {
                warn!(kind = %err.kind, error = %err, "stream failed");
                sink.end_stream().await;
                return Err(err);
            }
        };

        let payload = match frame {
            Frame::Done => break StreamOutcome::Completed,
            Frame::ServerError(message) => {
                warn!(%message, "server reported an error");
                break StreamOutcome::ServerError(message);
            }
            Frame::Data(payload) => payload,
        };

        let event = match classify(&payload) {
            Ok(event) => event,
            Err(err) => {
                let details = err.details.as_deref().unwrap_or("");
                warn!(error = %err, details, "dropping frame");
                dropped += 1;
                continue;
            }
        };

        debug!(node_id = %event.node_id, event_type = %event.event_type(), "applying event");
        match sink.apply_event(event).await {
            Ok(()) => events += 1,
            Err(StoreError::Closed) => break StreamOutcome::Cancelled,
            Err(err) => {
                warn!(error = %err, "dropping rejected event");
                dropped += 1;
            }
        }
    };

    sink.end_stream().await;
    info!(?outcome, events, dropped, "stream finished");
    Ok(StreamSummary {
        outcome,
        events,
        dropped,
    })
}
