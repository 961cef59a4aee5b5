//! Execution log entries kept by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Task input handed to a node, or a human reply routed to it.
    Input,
    /// Workflow-level progress and anomalies.
    Execution,
    /// Output chunk from a running node.
    Output,
    Start,
    Complete,
    Error,
}

impl LogKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Input => "input",
            LogKind::Execution => "execution",
            LogKind::Output => "output",
            LogKind::Start => "start",
            LogKind::Complete => "complete",
            LogKind::Error => "error",
        }
    }
}

impl std::str::FromStr for LogKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "input" => Ok(Self::Input),
            "execution" => Ok(Self::Execution),
            "output" => Ok(Self::Output),
            "start" => Ok(Self::Start),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log kind: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Empty for workflow-level entries.
    pub node_id: String,
    pub kind: LogKind,
    pub content: String,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        node_id: impl Into<String>,
        kind: LogKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            node_id: node_id.into(),
            kind,
            content: content.into(),
        }
    }
}

/// Selects log entries by node and/or kind. The default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub node_id: Option<String>,
    pub kind: Option<LogKind>,
}

impl LogFilter {
    pub fn node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            kind: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: LogKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.node_id.as_deref().is_none_or(|id| id == entry.node_id)
            && self.kind.is_none_or(|kind| kind == entry.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_node_and_kind() {
        let now = Utc::now();
        let output = LogEntry::new(now, "a", LogKind::Output, "x");
        let start = LogEntry::new(now, "a", LogKind::Start, "");
        let other = LogEntry::new(now, "b", LogKind::Output, "y");

        let filter = LogFilter::node("a").with_kind(LogKind::Output);
        assert!(filter.matches(&output));
        assert!(!filter.matches(&start));
        assert!(!filter.matches(&other));
        assert!(LogFilter::default().matches(&other));
    }

    #[test]
    fn test_log_kind_parses_wire_names() {
        assert_eq!("execution".parse::<LogKind>(), Ok(LogKind::Execution));
        assert!("verbose".parse::<LogKind>().is_err());
    }
}
