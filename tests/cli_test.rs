//! Smoke tests for the `mcpm` binary.
//!
//! Every test uses its own config and state directory, and clears the
//! environment variables that would change how the binary behaves.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn mcpm_binary() -> String {
    env!("CARGO_BIN_EXE_mcpm").to_string()
}

fn create_test_config(temp_dir: &TempDir, content: &str) -> PathBuf {
    let config_path = temp_dir.path().join("mcp_servers.yaml");
    fs::write(&config_path, content).expect("Failed to write config");
    config_path
}

fn mcpm(config: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(mcpm_binary());
    cmd.arg("--config")
        .arg(config)
        .args(args)
        .env_remove("MCPM_SERVER_NAME")
        .env_remove("MCPM_STATE_DIR")
        .env_remove("MCP_DAEMON_MODE")
        .env_remove("EXTERNAL_HOST")
        .env("REAL_HOST_IP", "10.0.0.5");
    cmd
}

fn run(config: &Path, args: &[&str]) -> Output {
    mcpm(config, args).output().expect("Failed to run mcpm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const BASIC_CONFIG: &str = r#"
servers:
  - name: fetch
    type: uvx
    sse_port: 23101
    start_command: sleep 30
  - name: idle
    enabled: false
    start_command: sleep 30
"#;

// ============================================================================
// Help and validation
// ============================================================================

#[test]
fn test_help_lists_commands() {
    let output = Command::new(mcpm_binary())
        .arg("--help")
        .output()
        .expect("Failed to run mcpm");

    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["start", "stop", "restart", "status", "daemon", "validate", "endpoints"] {
        assert!(out.contains(command), "help is missing '{}': {}", command, out);
    }
}

#[test]
fn test_validate_valid_config() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["validate"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("fetch (uvx, port 23101)"));
    assert!(out.contains("idle (-, disabled)"));
    assert!(out.contains("Configuration is valid"));
}

#[test]
fn test_validate_reports_invalid_entries() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(
        &dir,
        "servers:\n  - name: ok\n    start_command: sleep 1\n  - name: broken\n",
    );

    let output = run(&config, &["validate"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("broken"));
}

#[test]
fn test_unknown_server_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["start", "nope"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Server not found: nope"), "{}", err);
    assert!(err.contains("Hint:"), "{}", err);
}

// ============================================================================
// Status and endpoints
// ============================================================================

#[test]
fn test_status_json_for_stopped_servers() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["status", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let statuses: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let list = statuses.as_array().expect("array");
    assert_eq!(list.len(), 1, "disabled entries are hidden: {}", statuses);
    assert_eq!(list[0]["name"], "fetch");
    assert_eq!(list[0]["state"], "STOPPED");
    assert_eq!(list[0]["pid"], serde_json::Value::Null);
    assert_eq!(list[0]["url"], "http://10.0.0.5:23101/sse");
}

#[test]
fn test_endpoints_json() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["endpoints", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let endpoints: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        endpoints,
        serde_json::json!([{
            "name": "fetch",
            "resolved_host": "10.0.0.5",
            "bind_port": 23101,
            "allow_origin": "*",
            "url": "http://10.0.0.5:23101/sse"
        }])
    );
}

#[test]
fn test_host_json_uses_override() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["host", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let info: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(info["resolved_host"], "10.0.0.5");
    assert_eq!(info["source"], "override");
}

// ============================================================================
// Lifecycle through the binary
// ============================================================================

#[cfg(unix)]
#[test]
fn test_start_status_stop_roundtrip() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["start", "fetch"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("started (PID"));
    assert!(dir.path().join(".mcpm/records/fetch.json").exists());

    // The server outlives the command that started it.
    let output = run(&config, &["status", "fetch", "--json"]);
    let statuses: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(statuses[0]["state"], "RUNNING");

    let output = run(&config, &["start", "fetch"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("already running"));

    let output = run(&config, &["stop"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("stopped (PID"));
    assert!(!dir.path().join(".mcpm/records/fetch.json").exists());
}

#[cfg(unix)]
#[test]
fn test_state_dir_flag_overrides_default() {
    let dir = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);
    let state_arg = state.path().to_str().unwrap();

    let output = run(&config, &["--state-dir", state_arg, "start", "fetch"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(state.path().join("records/fetch.json").exists());
    assert!(!dir.path().join(".mcpm").exists());

    let output = run(&config, &["--state-dir", state_arg, "stop", "fetch"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

// ============================================================================
// Guards
// ============================================================================

#[test]
fn test_circular_invocation_is_refused() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = mcpm(&config, &["start"])
        .env("MCPM_SERVER_NAME", "fetch")
        .output()
        .expect("Failed to run mcpm");

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Circular invocation detected"), "{}", err);
    assert!(err.contains("fetch"), "{}", err);
    assert!(!dir.path().join(".mcpm/records").exists());
}

#[test]
fn test_circular_guard_allows_read_only_commands() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = mcpm(&config, &["status"])
        .env("MCPM_SERVER_NAME", "fetch")
        .output()
        .expect("Failed to run mcpm");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn test_zero_interval_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, BASIC_CONFIG);

    let output = run(&config, &["daemon", "--interval", "0"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--interval"));
}
