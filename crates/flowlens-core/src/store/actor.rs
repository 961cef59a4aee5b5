//! Single-writer task that owns an [`ExecutionStore`].
//!
//! Stream consumers and UI actions are all producers on one queue, so every
//! mutation lands on the same timeline without locking.

use std::collections::HashMap;

use flowlens_types::{NodeExecutionMeta, TokenUsage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ExecutionStore, LogEntry, LogFilter, StoreAction, StoreError, StoreSnapshot};

enum Command {
    Apply {
        action: StoreAction,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Snapshot(oneshot::Sender<StoreSnapshot>),
    Meta {
        node_id: String,
        reply: oneshot::Sender<Option<NodeExecutionMeta>>,
    },
    Outputs(oneshot::Sender<HashMap<String, String>>),
    Logs {
        filter: LogFilter,
        offset: usize,
        reply: oneshot::Sender<Vec<LogEntry>>,
    },
    TotalUsage(oneshot::Sender<TokenUsage>),
}

/// Cloneable handle to a store task.
///
/// Every method fails with [`StoreError::Closed`] once the task has stopped.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<Command>,
}

/// Moves `store` into its own task.
///
/// The task runs until every handle is dropped and then yields the store
/// back through the join handle.
pub fn spawn(store: ExecutionStore) -> (StoreHandle, JoinHandle<ExecutionStore>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(store, rx));
    (StoreHandle { tx }, task)
}

async fn run(
    mut store: ExecutionStore,
    mut rx: mpsc::UnboundedReceiver<Command>,
) -> ExecutionStore {
    while let Some(command) = rx.recv().await {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::Apply { action, reply } => {
                let _ = reply.send(store.apply(action));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(store.snapshot());
            }
            Command::Meta { node_id, reply } => {
                let _ = reply.send(store.meta(&node_id).cloned());
            }
            Command::Outputs(reply) => {
                let _ = reply.send(store.outputs());
            }
            Command::Logs {
                filter,
                offset,
                reply,
            } => {
                let _ = reply.send(store.logs_since(offset, &filter).cloned().collect());
            }
            Command::TotalUsage(reply) => {
                let _ = reply.send(store.total_usage());
            }
        }
    }
    debug!("store task stopped: all handles dropped");
    store
}

impl StoreHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Queues an action and waits for the store's verdict.
    ///
    /// # Errors
    /// Returns the store's rejection, or [`StoreError::Closed`].
    pub async fn apply(&self, action: StoreAction) -> Result<(), StoreError> {
        self.request(|reply| Command::Apply { action, reply }).await?
    }

    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        self.request(Command::Snapshot).await
    }

    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn meta(
        &self,
        node_id: impl Into<String>,
    ) -> Result<Option<NodeExecutionMeta>, StoreError> {
        let node_id = node_id.into();
        self.request(|reply| Command::Meta { node_id, reply }).await
    }

    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn outputs(&self) -> Result<HashMap<String, String>, StoreError> {
        self.request(Command::Outputs).await
    }

    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn logs(&self, filter: LogFilter) -> Result<Vec<LogEntry>, StoreError> {
        self.logs_since(filter, 0).await
    }

    /// Entries matching `filter` among those recorded after the first `offset`.
    ///
    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn logs_since(
        &self,
        filter: LogFilter,
        offset: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.request(|reply| Command::Logs {
            filter,
            offset,
            reply,
        })
        .await
    }

    /// # Errors
    /// Returns [`StoreError::Closed`] if the store task has stopped.
    pub async fn total_usage(&self) -> Result<TokenUsage, StoreError> {
        self.request(Command::TotalUsage).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use flowlens_types::{ExecutionEvent, NodeStatus};

    use super::*;
    use crate::store::LogKind;

    #[tokio::test]
    async fn test_handle_serializes_producers() {
        let (handle, task) = spawn(ExecutionStore::new(["a", "b"]));
        handle
            .apply(StoreAction::BeginRun { input: None })
            .await
            .unwrap();

        let stream = handle.clone();
        let ui = handle.clone();
        let producer = tokio::spawn(async move {
            stream
                .apply(StoreAction::Event(ExecutionEvent::node_start("a")))
                .await
                .unwrap();
            stream
                .apply(StoreAction::Event(ExecutionEvent::node_output("a", "hi")))
                .await
                .unwrap();
        });
        producer.await.unwrap();
        ui.apply(StoreAction::HumanReply {
            node_id: "a".to_string(),
            text: "ok".to_string(),
        })
        .await
        .unwrap();

        let meta = handle.meta("a").await.unwrap().unwrap();
        assert_eq!(meta.status, NodeStatus::Running);
        assert_eq!(meta.output, "hi");

        let inputs = handle
            .logs(LogFilter::node("a").with_kind(LogKind::Input))
            .await
            .unwrap();
        assert_eq!(inputs.len(), 1);

        let tail = handle.logs_since(LogFilter::default(), 2).await.unwrap();
        let kinds: Vec<LogKind> = tail.iter().map(|entry| entry.kind).collect();
        assert_eq!(kinds, vec![LogKind::Input]);

        drop((handle, ui));
        let store = task.await.unwrap();
        assert_eq!(store.status("a"), Some(NodeStatus::Running));
    }

    #[tokio::test]
    async fn test_rejections_come_back_through_handle() {
        let (handle, _task) = spawn(ExecutionStore::new(["a"]));
        let err = handle
            .apply(StoreAction::Event(ExecutionEvent::node_start("zzz")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownNode { .. }));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.nodes.len(), 1);
        assert!(handle.total_usage().await.unwrap().is_zero());
        assert!(handle.outputs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_store_reports_closed() {
        let (handle, task) = spawn(ExecutionStore::new(["a"]));
        task.abort();
        let _ = task.await;

        let err = handle.snapshot().await.unwrap_err();
        assert_eq!(err, StoreError::Closed);
        assert!(handle.is_closed());
    }
}
