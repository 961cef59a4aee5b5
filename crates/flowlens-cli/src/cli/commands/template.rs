//! Template command handlers.

use std::path::Path;

use anyhow::{Result, bail};
use flowlens_core::graph::WorkflowGraph;

pub fn check(graph_path: &Path) -> Result<()> {
    let graph = WorkflowGraph::load(graph_path)?;
    let issues = graph.validate_templates();
    if issues.is_empty() {
        println!("All templates valid ({} nodes)", graph.nodes.len());
        return Ok(());
    }

    for (node_id, issue) in &issues {
        println!("{node_id}: {issue}");
    }
    bail!("{} template issue(s) found", issues.len());
}

pub fn preview(graph_path: &Path, node_id: &str, input: Option<&str>) -> Result<()> {
    let graph = WorkflowGraph::load(graph_path)?;
    let Some(node) = graph.node(node_id) else {
        bail!("Unknown node '{node_id}'");
    };
    if node.task.is_none() {
        bail!("Node '{node_id}' has no task");
    }

    if let Some(preview) = graph.preview_task(node_id, input) {
        println!("{preview}");
    }
    Ok(())
}
