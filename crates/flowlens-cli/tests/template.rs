//! Integration tests for `flowlens template`.

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_template_check_passes_for_valid_graph() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["template", "check", "--graph"])
        .arg(fixture("graph.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("All templates valid (3 nodes)"));
}

#[test]
fn test_template_check_reports_unknown_reference() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["template", "check", "--graph"])
        .arg(fixture("bad_templates.json"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("writer: unknown placeholder '{{node_reviewer}}'"))
        .stderr(predicate::str::contains("1 template issue(s) found"));
}

#[test]
fn test_template_preview() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["template", "preview", "--node", "search", "--input", "a trip", "--graph"])
        .arg(fixture("graph.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Search for [Planner: example agent response]",
        ));
}

#[test]
fn test_template_preview_unknown_node() {
    let home = TempDir::new().unwrap();
    cargo_bin_cmd!("flowlens")
        .env("FLOWLENS_HOME", home.path())
        .args(["template", "preview", "--node", "ghost", "--graph"])
        .arg(fixture("graph.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown node 'ghost'"));
}
