//! Start a run on the server and follow its stream.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use flowlens_core::config::Config;
use flowlens_core::graph::WorkflowGraph;
use flowlens_core::store::{
    ExecutionStore, LogEntry, LogFilter, LogKind, RunId, RunRegistry, StoreAction, StoreHandle,
    spawn,
};
use flowlens_core::stream::{
    RunRequest, StreamResult, StreamSummary, consume_into_handle, open_stream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::summary;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn run(
    graph_path: &Path,
    input: Option<String>,
    url: Option<&str>,
    config: &Config,
) -> Result<()> {
    let raw_graph = fs::read_to_string(graph_path).with_context(|| {
        format!("Failed to read workflow graph from {}", graph_path.display())
    })?;
    let workflow: serde_json::Value = serde_json::from_str(&raw_graph).with_context(|| {
        format!("Failed to parse workflow graph from {}", graph_path.display())
    })?;
    let graph = WorkflowGraph::from_value(&workflow).with_context(|| {
        format!("Failed to parse workflow graph from {}", graph_path.display())
    })?;

    let url = match url {
        Some(url) => url.to_string(),
        None => config.stream_url()?,
    };

    let mut client = reqwest::Client::builder();
    if let Some(timeout) = config.connect_timeout() {
        client = client.connect_timeout(timeout);
    }
    let client = client.build().context("build http client")?;

    let store = ExecutionStore::new(graph.node_ids()).with_orphan_policy(config.orphan_policy);
    let (handle, task) = spawn(store);
    handle
        .apply(StoreAction::BeginRun {
            input: input.clone(),
        })
        .await
        .context("begin run")?;

    let mut registry = RunRegistry::new();
    let (run_id, cancel) = registry.register(handle.clone());
    info!(%run_id, %url, "starting run");

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received; cancelling run");
            ctrl_c.cancel();
        }
    });

    let request = RunRequest {
        input,
        workflow: Some(workflow),
    };
    let run = Run {
        client: &client,
        url: &url,
        request: &request,
    };
    let result = run.execute(&handle, &mut registry, run_id, &cancel).await;

    let snapshot = handle.snapshot().await.context("read final state")?;
    drop(handle);
    let _ = task.await;

    let Some(result) = result? else {
        return Ok(());
    };
    summary::print(&snapshot, &result);
    summary::check_outcome(&result)
}

struct Run<'a> {
    client: &'a reqwest::Client,
    url: &'a str,
    request: &'a RunRequest,
}

impl Run<'_> {
    /// Streams the run into `handle`, then marks the stream ended and drops
    /// the run from `registry` whatever the outcome.
    async fn execute(
        &self,
        handle: &StoreHandle,
        registry: &mut RunRegistry,
        run_id: RunId,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamSummary>> {
        let result = self.stream(handle, cancel).await;
        if let Err(err) = handle.apply(StoreAction::StreamEnded).await {
            debug!(error = %err, "store gone before stream end was recorded");
        }
        registry.discard(run_id);
        result
    }

    async fn stream(
        &self,
        handle: &StoreHandle,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamSummary>> {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            opened = open_stream(self.client, self.url, self.request) => Some(opened),
        };
        let Some(opened) = opened else {
            println!("Cancelled before the stream opened");
            return Ok(None);
        };
        let frames = opened.with_context(|| format!("open stream at {}", self.url))?;
        follow(consume_into_handle(frames, handle, cancel), handle).await
    }
}

/// Drives consumption while printing new log entries as they land.
async fn follow<F>(consumption: F, handle: &StoreHandle) -> Result<Option<StreamSummary>>
where
    F: Future<Output = StreamResult<StreamSummary>>,
{
    tokio::pin!(consumption);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut printed = 0;

    let result = loop {
        tokio::select! {
            result = &mut consumption => break result,
            _ = ticker.tick() => {
                printed = print_new_entries(handle, printed).await?;
            }
        }
    };
    print_new_entries(handle, printed).await?;

    let summary = result.context("stream failed")?;
    Ok(Some(summary))
}

async fn print_new_entries(handle: &StoreHandle, printed: usize) -> Result<usize> {
    let entries = handle
        .logs_since(LogFilter::default(), printed)
        .await
        .context("read execution log")?;
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(printed + entries.len())
}

fn format_entry(entry: &LogEntry) -> String {
    let time = entry.timestamp.format("%H:%M:%S");
    let scope = if entry.node_id.is_empty() {
        "workflow"
    } else {
        entry.node_id.as_str()
    };
    match entry.kind {
        LogKind::Output => format!("{time} {scope} | {}", entry.content),
        kind => format!("{time} {scope} [{}] {}", kind.as_str(), entry.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started() -> (StoreHandle, RunRegistry, RunId, CancellationToken) {
        let (handle, _task) = spawn(ExecutionStore::new(["a"]));
        handle
            .apply(StoreAction::BeginRun { input: None })
            .await
            .unwrap();
        let mut registry = RunRegistry::new();
        let (run_id, cancel) = registry.register(handle.clone());
        (handle, registry, run_id, cancel)
    }

    fn request() -> RunRequest {
        RunRequest {
            input: None,
            workflow: None,
        }
    }

    #[tokio::test]
    async fn test_failed_open_still_ends_run() {
        let (handle, mut registry, run_id, cancel) = started().await;
        let client = reqwest::Client::new();
        let request = request();
        let run = Run {
            client: &client,
            url: "http://127.0.0.1:1/api/workflows/run",
            request: &request,
        };

        let result = run.execute(&handle, &mut registry, run_id, &cancel).await;

        assert!(result.is_err());
        assert!(registry.is_empty());
        assert!(!handle.snapshot().await.unwrap().executing);
    }

    #[tokio::test]
    async fn test_cancel_before_open_still_ends_run() {
        let (handle, mut registry, run_id, cancel) = started().await;
        cancel.cancel();
        let client = reqwest::Client::new();
        let request = request();
        let run = Run {
            client: &client,
            url: "http://127.0.0.1:1/api/workflows/run",
            request: &request,
        };

        let result = run.execute(&handle, &mut registry, run_id, &cancel).await;

        assert!(result.unwrap().is_none());
        assert!(registry.is_empty());
        assert!(!handle.snapshot().await.unwrap().executing);
    }
}
