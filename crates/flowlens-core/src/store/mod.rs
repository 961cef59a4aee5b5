//! Node execution state store.
//!
//! Holds per-node status, timestamps, accumulated output and token usage for
//! one execution session, plus the ordered execution log and the
//! workflow-wide token total. All mutation goes through [`StoreAction`]s so
//! stream events and UI-initiated actions share one timeline.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use flowlens_types::{
    EventPayload, EventType, ExecutionEvent, NodeExecutionMeta, NodeStatus, TokenUsage,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod actor;
pub mod log;
pub mod registry;

pub use actor::{StoreHandle, spawn};
pub use log::{LogEntry, LogFilter, LogKind};
pub use registry::{RunId, RunRegistry};

/// Error text recorded on nodes orphaned by `workflow_complete`.
pub const ORPHANED_ERROR: &str = "orphaned: workflow completed while node was still running";

/// What happens to nodes still running when the workflow reports completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Force them into `Error` with [`ORPHANED_ERROR`].
    #[default]
    MarkError,
    /// Leave them `Running`.
    Leave,
}

/// A mutation applied to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreAction {
    /// A new run is starting: reset every node and record the initial input.
    BeginRun { input: Option<String> },
    /// Event decoded from the execution stream.
    Event(ExecutionEvent),
    /// Human-in-the-loop reply routed to a node.
    HumanReply { node_id: String, text: String },
    /// UI-initiated reset.
    Clear,
    /// The stream stopped (sentinel, transport close or cancellation).
    StreamEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Event names a node that is not part of the workflow graph.
    UnknownNode { node_id: String },
    /// Event would move a node backwards or skip a state.
    InvalidTransition {
        node_id: String,
        from: NodeStatus,
        event: EventType,
    },
    /// Output arrived for a node that already finished; it was not merged.
    PostTerminalOutput { node_id: String, status: NodeStatus },
    /// The store task is gone (only returned through a [`StoreHandle`]).
    Closed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownNode { node_id } => {
                write!(f, "event for unknown node '{node_id}'")
            }
            StoreError::InvalidTransition {
                node_id,
                from,
                event,
            } => write!(f, "invalid {event} for node '{node_id}' in state {from}"),
            StoreError::PostTerminalOutput { node_id, status } => {
                write!(f, "output for node '{node_id}' after it was {status}")
            }
            StoreError::Closed => write!(f, "execution store is closed"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Point-in-time copy of the store for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    /// Node metas in graph order.
    pub nodes: Vec<(String, NodeExecutionMeta)>,
    pub total_usage: TokenUsage,
    pub executing: bool,
}

#[derive(Debug, Clone)]
pub struct ExecutionStore {
    order: Vec<String>,
    nodes: HashMap<String, NodeExecutionMeta>,
    log: Vec<LogEntry>,
    total_usage: TokenUsage,
    executing: bool,
    input: Option<String>,
    orphan_policy: OrphanPolicy,
}

impl ExecutionStore {
    /// Creates a store with every known node idle.
    pub fn new<I, S>(node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut nodes = HashMap::new();
        for id in node_ids {
            let id = id.into();
            if nodes.insert(id.clone(), NodeExecutionMeta::default()).is_none() {
                order.push(id);
            }
        }
        Self {
            order,
            nodes,
            log: Vec::new(),
            total_usage: TokenUsage::default(),
            executing: false,
            input: None,
            orphan_policy: OrphanPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    /// Applies an action at the current time.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when the action is rejected; the store is
    /// left unchanged except for any anomaly log entry.
    pub fn apply(&mut self, action: StoreAction) -> Result<(), StoreError> {
        self.apply_at(action, Utc::now())
    }

    /// Applies an action with an explicit timestamp.
    ///
    /// # Errors
    /// See [`ExecutionStore::apply`].
    pub fn apply_at(
        &mut self,
        action: StoreAction,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match action {
            StoreAction::BeginRun { input } => {
                info!(nodes = self.order.len(), "execution started");
                self.reset();
                self.executing = true;
                if let Some(text) = &input {
                    self.log
                        .push(LogEntry::new(now, "", LogKind::Input, text.clone()));
                }
                self.input = input;
                Ok(())
            }
            StoreAction::Clear => {
                self.reset();
                self.executing = false;
                self.input = None;
                Ok(())
            }
            StoreAction::StreamEnded => {
                self.executing = false;
                Ok(())
            }
            StoreAction::HumanReply { node_id, text } => {
                if !self.nodes.contains_key(&node_id) {
                    return Err(StoreError::UnknownNode { node_id });
                }
                self.log.push(LogEntry::new(now, node_id, LogKind::Input, text));
                Ok(())
            }
            StoreAction::Event(event) => self.apply_event(event, now),
        }
    }

    fn apply_event(
        &mut self,
        event: ExecutionEvent,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let ExecutionEvent { node_id, payload } = event;
        if let EventPayload::WorkflowComplete = payload {
            self.complete_workflow(now);
            return Ok(());
        }

        let event_type = payload.event_type();
        let Some(meta) = self.nodes.get_mut(&node_id) else {
            return Err(StoreError::UnknownNode { node_id });
        };
        let invalid = |from: NodeStatus, node_id: String| StoreError::InvalidTransition {
            node_id,
            from,
            event: event_type,
        };

        match payload {
            EventPayload::NodeStart { input } => {
                if meta.status != NodeStatus::Idle {
                    return Err(invalid(meta.status, node_id));
                }
                *meta = NodeExecutionMeta {
                    status: NodeStatus::Running,
                    start_time: Some(now),
                    ..NodeExecutionMeta::default()
                };
                self.log
                    .push(LogEntry::new(now, node_id.clone(), LogKind::Start, "Node started"));
                if let Some(input) = input {
                    self.log.push(LogEntry::new(now, node_id, LogKind::Input, input));
                }
            }
            EventPayload::NodeOutput { chunk } => match meta.status {
                NodeStatus::Running => {
                    meta.output.push_str(&chunk);
                    self.log.push(LogEntry::new(now, node_id, LogKind::Output, chunk));
                }
                NodeStatus::Completed | NodeStatus::Error => {
                    let status = meta.status;
                    warn!(node_id = %node_id, %status, "dropping output for finished node");
                    self.log.push(LogEntry::new(
                        now,
                        node_id.clone(),
                        LogKind::Error,
                        format!("Ignored output received after node was {status}: {chunk}"),
                    ));
                    return Err(StoreError::PostTerminalOutput { node_id, status });
                }
                NodeStatus::Idle => return Err(invalid(meta.status, node_id)),
            },
            EventPayload::NodeComplete {
                elapsed_time,
                token_usage,
            } => {
                if meta.status != NodeStatus::Running {
                    return Err(invalid(meta.status, node_id));
                }
                let elapsed = elapsed_time
                    .or_else(|| meta.start_time.map(|start| seconds_between(start, now)));
                meta.status = NodeStatus::Completed;
                meta.end_time = Some(now);
                meta.elapsed_time = elapsed;
                meta.token_usage = token_usage;
                if let Some(usage) = token_usage {
                    self.total_usage += usage;
                }
                let summary = match elapsed {
                    Some(secs) => format!("Node completed in {secs:.2}s"),
                    None => "Node completed".to_string(),
                };
                self.log.push(LogEntry::new(now, node_id, LogKind::Complete, summary));
            }
            EventPayload::NodeError { error } => {
                if meta.status.is_terminal() {
                    return Err(invalid(meta.status, node_id));
                }
                meta.status = NodeStatus::Error;
                meta.end_time = Some(now);
                meta.elapsed_time = meta.start_time.map(|start| seconds_between(start, now));
                meta.error = Some(error.clone());
                self.log.push(LogEntry::new(now, node_id, LogKind::Error, error));
            }
            EventPayload::WorkflowComplete => {}
        }
        Ok(())
    }

    fn complete_workflow(&mut self, now: DateTime<Utc>) {
        self.executing = false;
        self.log.push(LogEntry::new(
            now,
            "",
            LogKind::Execution,
            "Workflow completed",
        ));

        if self.orphan_policy == OrphanPolicy::Leave {
            return;
        }
        for id in &self.order {
            let Some(meta) = self.nodes.get_mut(id) else {
                continue;
            };
            if meta.status != NodeStatus::Running {
                continue;
            }
            warn!(node_id = %id, "node still running at workflow completion; marking as error");
            meta.status = NodeStatus::Error;
            meta.end_time = Some(now);
            meta.elapsed_time = meta.start_time.map(|start| seconds_between(start, now));
            meta.error = Some(ORPHANED_ERROR.to_string());
            self.log
                .push(LogEntry::new(now, id.clone(), LogKind::Error, ORPHANED_ERROR));
        }
    }

    fn reset(&mut self) {
        for meta in self.nodes.values_mut() {
            *meta = NodeExecutionMeta::default();
        }
        self.log.clear();
        self.total_usage = TokenUsage::default();
    }

    pub fn meta(&self, node_id: &str) -> Option<&NodeExecutionMeta> {
        self.nodes.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.meta(node_id).map(|meta| meta.status)
    }

    /// Node ids in graph order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            nodes: self
                .order
                .iter()
                .filter_map(|id| self.nodes.get(id).map(|meta| (id.clone(), meta.clone())))
                .collect(),
            total_usage: self.total_usage,
            executing: self.executing,
        }
    }

    /// Current output of every node that has produced any, for template resolution.
    pub fn outputs(&self) -> HashMap<String, String> {
        self.nodes
            .iter()
            .filter(|(_, meta)| meta.status == NodeStatus::Completed || !meta.output.is_empty())
            .map(|(id, meta)| (id.clone(), meta.output.clone()))
            .collect()
    }

    /// Log entries matching `filter`, in the order they were recorded.
    pub fn logs<'s>(
        &'s self,
        filter: &LogFilter,
    ) -> impl Iterator<Item = &'s LogEntry> + use<'s> {
        self.logs_since(0, filter)
    }

    /// Like [`logs`](Self::logs), skipping the first `offset` recorded entries.
    pub fn logs_since<'s>(
        &'s self,
        offset: usize,
        filter: &LogFilter,
    ) -> impl Iterator<Item = &'s LogEntry> + use<'s> {
        let filter = filter.clone();
        self.log
            .iter()
            .skip(offset)
            .filter(move |entry| filter.matches(entry))
    }

    /// Number of entries recorded so far.
    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn total_usage(&self) -> TokenUsage {
        self.total_usage
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Initial input of the current run.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    pub fn running_nodes(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| self.status(id) == Some(NodeStatus::Running))
            .map(String::as_str)
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
