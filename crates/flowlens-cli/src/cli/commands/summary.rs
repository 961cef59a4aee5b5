//! Run summaries shared by `replay` and `watch`.

use anyhow::{Result, bail};
use comfy_table::{ContentArrangement, Table};
use flowlens_core::messages::parse_log_messages;
use flowlens_core::store::StoreSnapshot;
use flowlens_core::stream::{StreamOutcome, StreamSummary};
use flowlens_types::{NodeExecutionMeta, NodeStatus};

const PREVIEW_CHARS: usize = 60;

pub fn print(snapshot: &StoreSnapshot, summary: &StreamSummary) {
    println!("{}", node_table(snapshot));

    let usage = snapshot.total_usage;
    println!(
        "Total tokens: {} in / {} out / {} total",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    );
    println!(
        "Stream: {} ({} events applied, {} dropped)",
        outcome_label(&summary.outcome),
        summary.events,
        summary.dropped
    );
}

pub fn print_json(snapshot: &StoreSnapshot, summary: &StreamSummary) -> Result<()> {
    let value = serde_json::json!({
        "summary": summary,
        "nodes": snapshot.nodes.iter().map(|(id, meta)| {
            serde_json::json!({ "id": id, "meta": meta })
        }).collect::<Vec<_>>(),
        "total_usage": snapshot.total_usage,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Prints every node's accumulated output as classified messages.
pub fn print_messages(snapshot: &StoreSnapshot) {
    for (id, meta) in &snapshot.nodes {
        if meta.output.is_empty() {
            continue;
        }
        println!("== {id} ==");
        for message in parse_log_messages(&meta.output) {
            let kind = message.kind().as_str();
            match message.tool_use() {
                Some(tool_use) => println!(
                    "[{kind}] {} {}",
                    tool_use.tool_name,
                    serde_json::Value::Object(tool_use.input.clone())
                ),
                None => println!("[{kind}] {}", message.content()),
            }
        }
    }
}

/// Turns a server-reported failure into a non-zero exit.
pub fn check_outcome(summary: &StreamSummary) -> Result<()> {
    if let StreamOutcome::ServerError(message) = &summary.outcome {
        bail!("Server reported an error: {message}");
    }
    Ok(())
}

fn node_table(snapshot: &StoreSnapshot) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Node", "Status", "Elapsed", "Tokens (in/out/total)", "Output"]);

    for (id, meta) in &snapshot.nodes {
        table.add_row(vec![
            id.clone(),
            meta.status.to_string(),
            meta.elapsed_time
                .map(|secs| format!("{secs:.2}s"))
                .unwrap_or_default(),
            meta.token_usage
                .map(|u| format!("{}/{}/{}", u.input_tokens, u.output_tokens, u.total_tokens))
                .unwrap_or_default(),
            detail(meta),
        ]);
    }
    table
}

fn detail(meta: &NodeExecutionMeta) -> String {
    if meta.status == NodeStatus::Error {
        return meta.error.clone().unwrap_or_default();
    }
    let first_line = meta.output.lines().next().unwrap_or("");
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}

fn outcome_label(outcome: &StreamOutcome) -> String {
    match outcome {
        StreamOutcome::Completed => "completed".to_string(),
        StreamOutcome::ServerError(message) => format!("server error: {message}"),
        StreamOutcome::Cancelled => "cancelled".to_string(),
        StreamOutcome::Closed => "closed without completion".to_string(),
    }
}
