//! Workflow graph: the node set events are validated against.
//!
//! Only what the engine needs is kept: node ids, their kind, an optional
//! label and the task template. Edges and layout stay with the editor.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::template::{self, PreviewContext, TemplateContext, TemplateIssue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Agent,
    Tool,
    Router,
    HumanInput,
    Output,
    #[serde(other)]
    Other,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Agent => "agent",
            NodeKind::Tool => "tool",
            NodeKind::Router => "router",
            NodeKind::HumanInput => "human_input",
            NodeKind::Output => "output",
            NodeKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Task template, may contain `{{...}}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            task: None,
        }
    }

    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Synthetic output shown in template previews.
    pub fn example_output(&self) -> String {
        let name = self.display_name();
        match self.kind {
            NodeKind::Agent => format!("[{name}: example agent response]"),
            NodeKind::Tool => format!("[{name}: example tool result]"),
            NodeKind::Router => format!("[{name}: selected branch]"),
            NodeKind::HumanInput => format!("[{name}: example human reply]"),
            NodeKind::Output => format!("[{name}: final output]"),
            NodeKind::Other => format!("[{name}: example output]"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<NodeDescriptor>,
}

impl WorkflowGraph {
    /// Loads a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow graph from {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse workflow graph from {}", path.display()))
    }

    /// Parses and validates a graph. Node ids must be non-empty and unique.
    pub fn from_json(json: &str) -> Result<Self> {
        let graph: WorkflowGraph = serde_json::from_str(json).context("Invalid graph JSON")?;
        graph.checked()
    }

    /// Like [`from_json`](Self::from_json), for a document that is already parsed.
    ///
    /// Fields the engine does not model (edges, layout) are ignored.
    pub fn from_value(value: &Value) -> Result<Self> {
        let graph = WorkflowGraph::deserialize(value).context("Invalid graph JSON")?;
        graph.checked()
    }

    fn checked(self) -> Result<Self> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                bail!("Node with empty id");
            }
            if !seen.insert(node.id.as_str()) {
                bail!("Duplicate node id '{}'", node.id);
            }
        }
        Ok(self)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.id.as_str())
    }

    pub fn known_ids(&self) -> HashSet<&str> {
        self.node_ids().collect()
    }

    pub fn node(&self, id: &str) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Unknown placeholders in every node's task, keyed by node id.
    pub fn validate_templates(&self) -> Vec<(&str, TemplateIssue)> {
        let known = self.known_ids();
        self.nodes
            .iter()
            .filter_map(|node| node.task.as_deref().map(|task| (node.id.as_str(), task)))
            .flat_map(|(id, task)| {
                template::validate(task, &known)
                    .into_iter()
                    .map(move |issue| (id, issue))
            })
            .collect()
    }

    /// Resolves a node's task against the run input and current outputs.
    ///
    /// Returns `None` for an unknown node or one without a task.
    pub fn resolve_task(
        &self,
        node_id: &str,
        input: Option<&str>,
        outputs: &HashMap<String, String>,
    ) -> Option<String> {
        let task = self.node(node_id)?.task.as_deref()?;
        Some(template::resolve(
            task,
            &TemplateContext {
                input,
                nodes: outputs,
            },
        ))
    }

    /// Previews a node's task with example outputs for the other nodes.
    pub fn preview_task(&self, node_id: &str, input: Option<&str>) -> Option<String> {
        let task = self.node(node_id)?.task.as_deref()?;
        Some(template::preview(
            task,
            &PreviewContext {
                input,
                nodes: &self.nodes,
                current_node: Some(node_id),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const GRAPH: &str = r#"{
        "nodes": [
            {"id": "research", "kind": "agent", "label": "Researcher", "task": "Look into {{input}}"},
            {"id": "42", "kind": "tool", "task": "{{input}} then {{node_research}}"},
            {"id": "writer", "task": "Write using {{node_42}} and {{node_missing}}"},
            {"id": "gate", "kind": "approval"}
        ]
    }"#;

    #[test]
    fn test_from_json_defaults_and_unknown_kind() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["research", "42", "writer", "gate"]);
        assert_eq!(graph.node("writer").unwrap().kind, NodeKind::Agent);
        assert_eq!(graph.node("gate").unwrap().kind, NodeKind::Other);
    }

    #[test]
    fn test_from_value_keeps_document_intact() {
        let doc: Value = serde_json::from_str(
            r#"{"nodes":[{"id":"a","task":"{{input}}"}],"edges":[{"from":"a","to":"b"}]}"#,
        )
        .unwrap();
        let graph = WorkflowGraph::from_value(&doc).unwrap();
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["a"]);
        assert!(doc.get("edges").is_some());

        let dup = serde_json::json!({"nodes": [{"id": "a"}, {"id": "a"}]});
        assert!(WorkflowGraph::from_value(&dup).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = WorkflowGraph::from_json(r#"{"nodes":[{"id":"a"},{"id":"a"}]}"#).unwrap_err();
        assert!(err.to_string().contains("Duplicate node id 'a'"));
        assert!(WorkflowGraph::from_json(r#"{"nodes":[{"id":" "}]}"#).is_err());
    }

    #[test]
    fn test_validate_templates_reports_per_node() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        let issues = graph.validate_templates();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].0, "writer");
        assert_eq!(issues[0].1.placeholder, "node_missing");
    }

    #[test]
    fn test_resolve_task() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        let outputs = HashMap::from([("research".to_string(), "findings".to_string())]);

        assert_eq!(
            graph.resolve_task("42", Some("X"), &outputs).as_deref(),
            Some("X then findings")
        );
        assert_eq!(graph.resolve_task("gate", Some("X"), &outputs), None);
        assert_eq!(graph.resolve_task("nope", Some("X"), &outputs), None);
    }

    #[test]
    fn test_preview_task_uses_labels() {
        let graph = WorkflowGraph::from_json(GRAPH).unwrap();
        assert_eq!(
            graph.preview_task("42", None).as_deref(),
            Some("{{input}} then [Researcher: example agent response]")
        );
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = WorkflowGraph::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse workflow graph"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GRAPH.as_bytes()).unwrap();
        assert_eq!(WorkflowGraph::load(file.path()).unwrap().nodes.len(), 4);
    }
}
