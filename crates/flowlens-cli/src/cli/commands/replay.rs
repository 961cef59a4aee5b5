//! Replay a recorded stream through the engine.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use flowlens_core::config::Config;
use flowlens_core::graph::WorkflowGraph;
use flowlens_core::store::{ExecutionStore, StoreAction};
use flowlens_core::stream::{FrameStream, consume};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::summary;

pub struct ReplayOptions<'a> {
    pub graph: &'a Path,
    pub stream: &'a Path,
    pub chunk_size: usize,
    pub input: Option<&'a str>,
    pub logs: bool,
    pub json: bool,
    pub config: &'a Config,
}

pub async fn run(options: ReplayOptions<'_>) -> Result<()> {
    let graph = WorkflowGraph::load(options.graph)?;
    let recording = fs::read(options.stream)
        .with_context(|| format!("Failed to read stream from {}", options.stream.display()))?;

    let chunks: Vec<std::io::Result<Bytes>> = recording
        .chunks(options.chunk_size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    info!(bytes = recording.len(), chunks = chunks.len(), "replaying recording");

    let mut store =
        ExecutionStore::new(graph.node_ids()).with_orphan_policy(options.config.orphan_policy);
    store
        .apply(StoreAction::BeginRun {
            input: options.input.map(str::to_string),
        })
        .context("begin run")?;

    let frames = FrameStream::new(futures_util::stream::iter(chunks));
    let result = consume(frames, &mut store, &CancellationToken::new())
        .await
        .context("replay stream")?;

    let snapshot = store.snapshot();
    if options.json {
        summary::print_json(&snapshot, &result)?;
    } else {
        summary::print(&snapshot, &result);
        if options.logs {
            summary::print_messages(&snapshot);
        }
    }
    summary::check_outcome(&result)
}
