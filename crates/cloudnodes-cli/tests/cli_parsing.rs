//! CLI parsing tests for the cloudnodes command
//!
//! Tests that verify CLI argument parsing and the offline command paths.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
[account]
identity = "ops@example.com"
secret = "hunter2"
id = "4242"
endpoint = "https://cloud.example.com/"

[refresh]
interval_secs = 300

[filters]
input_pattern = "environment"

[node]
username = "deploy"
"#;

const FIXTURE: &str = r#"[
    {"kind": "server_array", "scope": "account", "resources": [
        {"href": "/api/server_arrays/5"}
    ]},
    {"kind": "instance", "scope": {"parent": "/api/server_arrays/5"}, "resources": [
        {"href": "/api/clouds/1/instances/W",
         "attributes": {"name": "worker", "resource_uid": "i-www", "state": "operational"}}
    ]}
]"#;

/// Get a Command for the cloudnodes binary, isolated from the user's home and env
#[allow(deprecated)]
fn cloudnodes(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("cloudnodes").expect("Failed to find cloudnodes binary");
    cmd.env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("CLOUDNODES_CONFIG")
        .env_remove("CLOUDNODES_IDENTITY")
        .env_remove("CLOUDNODES_SECRET")
        .env_remove("CLOUDNODES_ENDPOINT")
        .env_remove("CLOUDNODES_INTERVAL");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_shows_all_commands() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("nodes"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cloudnodes"));
}

#[test]
fn test_global_options_in_help() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--quiet"))
        .stdout(predicate::str::contains("--endpoint"))
        .stdout(predicate::str::contains("--full-fetch"));
}

#[test]
fn test_secret_env_value_hidden_in_help() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .env("CLOUDNODES_SECRET", "hunter2")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());
}

// ============================================================================
// Nodes Command Tests
// ============================================================================

#[test]
fn test_nodes_help() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .args(["nodes", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--fixture"));
}

#[test]
fn test_nodes_rejects_unknown_format() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .args(["nodes", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_nodes_from_fixture_as_json() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);
    let fixture = write(&dir, "fixture.json", FIXTURE);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["nodes", "--format", "json", "--fixture"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("worker i-www"))
        .stdout(predicate::str::contains("\"username\": \"deploy\""))
        .stdout(predicate::str::contains(
            "https://cloud.example.com/acct/4242/server_arrays/5/instances",
        ));
}

#[test]
fn test_nodes_from_fixture_as_yaml() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);
    let fixture = write(&dir, "fixture.json", FIXTURE);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["nodes", "-f", "yaml", "--fixture"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("username: deploy"));
}

#[test]
fn test_nodes_with_missing_fixture_fails() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["nodes", "--fixture", "/nonexistent/fixture.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("fixture"));
}

// ============================================================================
// Check Command Tests
// ============================================================================

#[test]
fn test_check_reports_missing_key() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .args(["check", "--offline"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("account.identity"));
}

#[test]
fn test_check_offline_valid_config() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["check", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("https://cloud.example.com"))
        .stdout(predicate::str::contains("minimal"));
}

#[test]
fn test_check_cli_overrides_apply() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["--full-fetch", "--interval=-1", "check", "--offline", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"strategy\": \"full\""))
        .stdout(predicate::str::contains("\"interval_secs\": -1"));
}

#[test]
fn test_check_with_fixture_refreshes() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);
    let fixture = write(&dir, "fixture.json", FIXTURE);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["check", "--fixture"])
        .arg(&fixture)
        .assert()
        .success()
        .stdout(predicate::str::contains("Refresh OK: 1 nodes"));
}

// ============================================================================
// Watch Command Tests
// ============================================================================

#[test]
fn test_watch_rejects_zero_poll() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .args(["watch", "--poll", "0"])
        .assert()
        .failure();
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_init_writes_starter_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested").join("config.toml");

    cloudnodes(dir.path())
        .args(["config", "init"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote starter config"));

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("[account]"));

    cloudnodes(dir.path())
        .args(["config", "init"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_show_redacts_secret() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", CONFIG);

    cloudnodes(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ops@example.com"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_path_json() {
    let home = TempDir::new().unwrap();
    cloudnodes(home.path())
        .args(["config", "path", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".cloudnodes"))
        .stdout(predicate::str::contains("\"global_exists\": false"));
}
