use mcp_manager::config::{Parser, ServerKind};
use mcp_manager::{render_command, Error, SupervisorContext};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).expect("Failed to write config");
    path
}

#[test]
fn test_full_config_loads() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.yaml",
        r#"
settings:
  poll_interval: 10s
  grace_period: 3s
  state_dir: run
  restart:
    max_restarts: 2
    backoff: 250ms

servers:
  - name: fetch
    type: uvx
    sse_host: 0.0.0.0
    sse_port: 23001
    allow_origin: "*"
    start_command: uvx mcp-server-fetch
    sse_start_command: npx -y supergateway --stdio "{start_command}" --port {sse_port} --host {sse_host} --cors {allow_origin}
    env:
      LOG_LEVEL: debug
      RETRIES: 3

  - name: filesystem
    type: node
    enabled: false
    start_command: npx -y @modelcontextprotocol/server-filesystem /data
"#,
    );

    let store = Parser::new().load_store(&path).unwrap();
    assert_eq!(store.path(), Some(path.as_path()));
    assert_eq!(store.servers().len(), 2);
    assert_eq!(store.enabled().count(), 1);
    assert!(store.entry_errors().is_empty());

    let fetch = store.require("fetch").unwrap();
    assert_eq!(fetch.kind, Some(ServerKind::Uvx));
    assert_eq!(fetch.bind_port, Some(23001));
    assert_eq!(fetch.env.get("RETRIES").map(String::as_str), Some("3"));

    let rendered = render_command(fetch).unwrap();
    assert_eq!(
        rendered.command,
        "npx -y supergateway --stdio \"uvx mcp-server-fetch\" --port 23001 --host 0.0.0.0 --cors '*'"
    );
    assert!(rendered.warnings.is_empty());

    let ctx = SupervisorContext::from_store(&store, Default::default());
    assert_eq!(ctx.state_dir, dir.path().join("run"));
    assert_eq!(ctx.log_dir, dir.path().join("run/logs"));
    assert_eq!(ctx.poll_interval, Duration::from_secs(10));
    assert_eq!(ctx.grace_period, Duration::from_secs(3));
    assert_eq!(ctx.restart.max_restarts, 2);
    assert_eq!(ctx.restart.backoff, Duration::from_millis(250));
}

#[test]
fn test_json_config_loads() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.json",
        r#"{"servers": [{"name": "time", "sse_port": "23002", "start_command": "uvx mcp-server-time"}]}"#,
    );

    let store = Parser::new().load_store(&path).unwrap();
    assert_eq!(store.require("time").unwrap().bind_port, Some(23002));
}

#[test]
fn test_relative_paths_resolve_against_config_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config/mcp_servers.yaml",
        r#"
servers:
  - name: local
    start_command: python server.py
    path: servers/local
  - name: checkout
    type: source_code
    repo: https://github.com/example/mcp-tools.git
    subdir: packages/search
    start_command: npm start
"#,
    );

    let store = Parser::new().load_store(&path).unwrap();
    assert_eq!(
        store.require("local").unwrap().working_directory,
        Some(dir.path().join("config/servers/local"))
    );
    // Source checkouts live beside config/, not inside it.
    assert_eq!(
        store.require("checkout").unwrap().working_directory,
        Some(dir.path().join("mcp-servers/mcp-tools/packages/search"))
    );
}

#[test]
fn test_invalid_entry_is_isolated() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.yaml",
        r#"
servers:
  - name: good
    start_command: uvx good
  - name: bad-port
    sse_port: 70000
    start_command: uvx bad
  - type: uvx
    start_command: uvx nameless
"#,
    );

    let store = Parser::new().load_store(&path).unwrap();
    assert_eq!(store.servers().len(), 1);
    assert_eq!(store.entry_errors().len(), 2);
    assert!(store.require("good").is_ok());

    match store.require("bad-port") {
        Err(Error::InvalidEntry { reason, .. }) => assert!(reason.contains("out of range")),
        other => panic!("expected InvalidEntry, got {:?}", other),
    }
    assert!(matches!(store.require("missing"), Err(Error::ServerNotFound(_))));
}

#[test]
fn test_duplicate_names_fail_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.yaml",
        r#"
servers:
  - name: twin
    start_command: a
  - name: twin
    start_command: b
"#,
    );

    let err = Parser::new().load_store(&path).unwrap_err();
    assert!(matches!(err, Error::DuplicateServer(ref n) if n == "twin"));
}

#[test]
fn test_template_problems_are_warnings() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.yaml",
        r#"
servers:
  - name: odd
    type: python
    start_command: run-odd
    sse_start_command: gw --cmd {start_command} --port {sse_port} --mode {mode}
"#,
    );

    let store = Parser::new().load_store(&path).unwrap();
    let warnings = store.warnings().join("\n");
    assert!(warnings.contains("python"), "{}", warnings);
    assert!(warnings.contains("{mode}"), "{}", warnings);
    assert!(warnings.contains("sse_port"), "{}", warnings);

    // Unfilled placeholders are left in place.
    let rendered = render_command(store.require("odd").unwrap()).unwrap();
    assert_eq!(rendered.command, "gw --cmd run-odd --port {sse_port} --mode {mode}");
    assert_eq!(rendered.warnings.len(), 2);
}

#[test]
fn test_bad_settings_fail_load() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcp_servers.yaml",
        "settings:\n  grace_period: soon\nservers: []\n",
    );
    assert!(matches!(
        Parser::new().load_store(&path),
        Err(Error::Validation(_))
    ));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Parser::new()
        .load_store(dir.path().join("nope.yaml"))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
