//! Registry of in-flight runs.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RunEntry {
    pub handle: StoreHandle,
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

/// Maps run ids to their store handles and cancellation tokens.
///
/// Owned by whoever drives runs; entries are added when a run starts and
/// removed when it ends.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: HashMap<RunId, RunEntry>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run and returns its id and cancellation token.
    pub fn register(&mut self, handle: StoreHandle) -> (RunId, CancellationToken) {
        let id = RunId::new();
        let cancel = CancellationToken::new();
        self.runs.insert(
            id,
            RunEntry {
                handle,
                cancel: cancel.clone(),
                started_at: Utc::now(),
            },
        );
        info!(run_id = %id, "run registered");
        (id, cancel)
    }

    pub fn get(&self, id: RunId) -> Option<&RunEntry> {
        self.runs.get(&id)
    }

    /// Signals cancellation. Returns false for an unknown run.
    pub fn cancel(&self, id: RunId) -> bool {
        match self.runs.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Removes a finished run.
    pub fn discard(&mut self, id: RunId) -> Option<RunEntry> {
        let entry = self.runs.remove(&id);
        if entry.is_some() {
            debug!(run_id = %id, "run discarded");
        }
        entry
    }

    /// Cancels and removes every run.
    pub fn shutdown(&mut self) {
        for (id, entry) in self.runs.drain() {
            debug!(run_id = %id, "cancelling run on shutdown");
            entry.cancel.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
