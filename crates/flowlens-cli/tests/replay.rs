//! Integration tests for `flowlens replay`.

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn replay_json(home: &TempDir, chunk_size: &str) -> Value {
    let output = cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .env_remove("RUST_LOG")
        .args(["replay", "--graph"])
        .arg(fixture("graph.json"))
        .args(["--chunk-size", chunk_size, "--json"])
        .arg(fixture("stream.sse"))
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_replay_json_summary() {
    let home = TempDir::new().unwrap();
    let value = replay_json(&home, "4096");

    assert_eq!(value["summary"]["outcome"], "completed");
    assert_eq!(value["summary"]["events"], 8);
    assert_eq!(value["summary"]["dropped"], 1);
    assert_eq!(value["total_usage"]["input_tokens"], 13);
    assert_eq!(value["total_usage"]["output_tokens"], 25);
    assert_eq!(value["total_usage"]["total_tokens"], 38);

    let nodes = value["nodes"].as_array().unwrap();
    assert_eq!(nodes[0]["id"], "planner");
    assert_eq!(nodes[0]["meta"]["status"], "completed");
    assert_eq!(nodes[1]["meta"]["output"], "3 results");
    assert_eq!(nodes[2]["meta"]["status"], "error");
    assert!(
        nodes[2]["meta"]["error"]
            .as_str()
            .unwrap()
            .starts_with("orphaned")
    );
}

#[test]
fn test_replay_is_independent_of_chunk_size() {
    let home = TempDir::new().unwrap();
    let whole = replay_json(&home, "100000");
    for size in ["1", "3", "17"] {
        let chunked = replay_json(&home, size);
        assert_eq!(chunked["summary"], whole["summary"], "chunk size {size}");
        assert_eq!(chunked["total_usage"], whole["total_usage"]);
        let pairs = chunked["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .zip(whole["nodes"].as_array().unwrap());
        for (a, b) in pairs {
            assert_eq!(a["meta"]["status"], b["meta"]["status"]);
            assert_eq!(a["meta"]["output"], b["meta"]["output"]);
        }
    }
}

#[test]
fn test_replay_orphan_policy_from_config() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.toml"), "orphan_policy = \"leave\"\n").unwrap();
    let value = replay_json(&home, "64");
    assert_eq!(value["nodes"][2]["meta"]["status"], "running");
}

#[test]
fn test_replay_table_and_logs() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["replay", "--logs", "--graph"])
        .arg(fixture("graph.json"))
        .arg(fixture("stream.sse"))
        .assert()
        .success()
        .stdout(predicate::str::contains("planner"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("Total tokens: 13 in / 25 out / 38 total"))
        .stdout(predicate::str::contains("8 events applied, 1 dropped"))
        .stdout(predicate::str::contains("[tool_use] grep"));
}

#[test]
fn test_replay_server_error_exits_nonzero() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["replay", "--graph"])
        .arg(fixture("graph.json"))
        .arg(fixture("server_error.sse"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("server error: agent crashed"))
        .stderr(predicate::str::contains("Server reported an error: agent crashed"));
}

#[test]
fn test_replay_missing_stream_file() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["replay", "--graph"])
        .arg(fixture("graph.json"))
        .arg(home.path().join("missing.sse"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read stream"));
}
