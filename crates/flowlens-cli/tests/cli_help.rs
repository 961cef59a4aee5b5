use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("flowlens")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("classify"))
        .stdout(predicate::str::contains("template"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_template_help_shows_subcommands() {
    cargo_bin_cmd!("flowlens")
        .args(["template", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("preview"));
}

#[test]
fn test_replay_rejects_zero_chunk_size() {
    cargo_bin_cmd!("flowlens")
        .args([
            "replay",
            "--graph",
            "graph.json",
            "--chunk-size",
            "0",
            "stream.sse",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk-size"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("flowlens")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}
