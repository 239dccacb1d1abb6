//! CLI integration tests for npdi-search
//!
//! Tests the npdi-search CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with an isolated config directory
#[allow(deprecated)]
fn npdi_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("npdi-search").unwrap();
    cmd.env("NPDI_SEARCH_CONFIG_DIR", config_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_search_finds_officer_in_sample() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["search", "John Smith"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Results for \"John Smith\""))
        .stdout(predicate::str::contains("/api/v1/officers/off-1001"));
}

#[test]
fn test_search_json_output() {
    let config_dir = TempDir::new().unwrap();

    let output = npdi_cmd(&config_dir)
        .args(["search", "  SMITH  ", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["query"]["key"], "smith");
    assert_eq!(result["query"]["display"], "SMITH");
    assert_eq!(result["deadline_exceeded"], false);
    assert!(result["total_matches"].as_u64().unwrap() >= 4);
    assert_eq!(result["categories"]["unit"]["status"], "completed");
}

#[test]
fn test_later_query_supersedes_earlier() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["search", "smith", "lopez", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Maria Lopez"))
        .stdout(predicate::str::contains("John Smith").not());
}

#[test]
fn test_search_respects_max_results() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["config", "set", "search.max_results", "1"])
        .assert()
        .success();

    npdi_cmd(&config_dir)
        .args(["search", "smith"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(showing 1 of"));
}

#[test]
fn test_search_no_results() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["search", "zzzzzz"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found matching \"zzzzzz\""));
}

#[test]
fn test_search_custom_dataset() {
    let config_dir = TempDir::new().unwrap();
    let dataset = config_dir.path().join("records.json");
    std::fs::write(
        &dataset,
        r#"[
            {"id": "u-9", "category": "unit", "label": "Harbor Patrol"},
            {"id": "a-9", "category": "agency", "label": "Port Authority Police"}
        ]"#,
    )
    .unwrap();

    npdi_cmd(&config_dir)
        .args(["search", "harbor", "--quiet", "--dataset"])
        .arg(&dataset)
        .assert()
        .success()
        .stdout(predicate::str::diff("unit\tu-9\tHarbor Patrol\n"));
}

#[test]
fn test_search_invalid_dataset_fails() {
    let config_dir = TempDir::new().unwrap();
    let dataset = config_dir.path().join("broken.json");
    std::fs::write(&dataset, "not json").unwrap();

    npdi_cmd(&config_dir)
        .args(["search", "smith", "--dataset"])
        .arg(&dataset)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse dataset"))
        .stderr(predicate::str::contains("Hint: A dataset is a JSON array"));
}

#[test]
fn test_interactive_reads_queries_from_stdin() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .arg("interactive")
        .write_stdin("lopez\nlopez\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Maria Lopez"))
        .stdout(predicate::str::contains("(cached, refreshing...)"))
        .stdout(predicate::str::contains("1 hits"));
}

#[test]
fn test_config_set_get_roundtrip() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["config", "set", "search.deadline_ms", "250"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set search.deadline_ms = 250"));

    npdi_cmd(&config_dir)
        .args(["config", "get", "search.deadline_ms"])
        .assert()
        .success()
        .stdout(predicate::str::diff("250\n"));

    assert!(config_dir.path().join("config.toml").exists());
}

#[test]
fn test_config_list_and_reset() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["config", "set", "search.cache_capacity", "5"])
        .assert()
        .success();

    npdi_cmd(&config_dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("search.cache_capacity = 5"))
        .stdout(predicate::str::contains("index.chunk_size = 25"));

    npdi_cmd(&config_dir)
        .args(["config", "reset"])
        .assert()
        .success();

    npdi_cmd(&config_dir)
        .args(["config", "get", "search.cache_capacity"])
        .assert()
        .success()
        .stdout(predicate::str::diff("50\n"));
}

#[test]
fn test_config_rejects_invalid_values() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["config", "set", "search.cache_capacity", "0"])
        .assert()
        .failure();

    npdi_cmd(&config_dir)
        .args(["config", "set", "search.category_precedence", "officer,civilian"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category 'civilian'"))
        .stderr(predicate::str::contains(
            "Hint: npdi-search config set search.category_precedence",
        ));

    npdi_cmd(&config_dir)
        .args(["config", "get", "search.nonexistent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_config_path() {
    let config_dir = TempDir::new().unwrap();

    npdi_cmd(&config_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
