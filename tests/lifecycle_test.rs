//! End-to-end lifecycle tests against real `/bin/sh` children.
//!
//! Each test gets its own state directory, so records, locks and logs never
//! leak between tests.
#![cfg(unix)]

use mcp_manager::config::{ServerSpec, ServerStore, Settings};
use mcp_manager::state::ProcessRecord;
use mcp_manager::{Started, Stopped, Supervisor, SupervisorContext};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn supervisor(dir: &Path, servers: Vec<ServerSpec>) -> Supervisor {
    let store = ServerStore::from_specs(servers, Settings::default()).expect("valid store");
    let ctx = SupervisorContext::for_state_dir(dir).with_grace_period(Duration::from_secs(2));
    Supervisor::new(ctx, store)
}

fn pid_exists(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn test_start_twice_keeps_single_process() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let first = sup.start("fetch").await.expect("first start");
    let pid = match first {
        Started::Spawned { pid, .. } => pid,
        other => panic!("expected a spawn, got {:?}", other),
    };

    let second = sup.start("fetch").await.expect("second start");
    assert_eq!(second, Started::AlreadyRunning { pid });

    let record = sup.records().read("fetch").unwrap().expect("record written");
    assert_eq!(record.pid, pid);
    assert_eq!(record.command, "sleep 30");

    sup.stop("fetch").await.unwrap();
}

#[tokio::test]
async fn test_stop_terminates_and_removes_record() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let pid = sup.start("fetch").await.unwrap().pid();
    assert!(pid_exists(pid));

    let stopped = sup.stop("fetch").await.unwrap();
    assert_eq!(stopped, Stopped::Stopped { pid, forced: false });
    assert!(sup.records().read("fetch").unwrap().is_none());

    // The child may linger as a zombie for a moment after the group exits.
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while pid_exists(pid) && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Stopping again is a no-op.
    assert_eq!(sup.stop("fetch").await.unwrap(), Stopped::NotRunning);
}

#[tokio::test]
async fn test_stop_forces_kill_when_term_is_ignored() {
    let dir = create_test_dir();
    let store = ServerStore::from_specs(
        vec![ServerSpec::new(
            "stubborn",
            "trap '' TERM; while true; do sleep 1; done",
        )],
        Settings::default(),
    )
    .unwrap();
    let ctx = SupervisorContext::for_state_dir(dir.path())
        .with_grace_period(Duration::from_millis(300));
    let sup = Supervisor::new(ctx, store);

    let pid = sup.start("stubborn").await.unwrap().pid();
    // Give the shell time to install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stopped = sup.stop("stubborn").await.unwrap();
    assert_eq!(stopped, Stopped::Stopped { pid, forced: true });
    assert!(sup.records().read("stubborn").unwrap().is_none());
}

#[tokio::test]
async fn test_restart_yields_new_pid() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let old_pid = sup.start("fetch").await.unwrap().pid();
    let restarted = sup.restart("fetch").await.unwrap();

    assert!(matches!(
        restarted.previous,
        Some(Stopped::Stopped { pid, .. }) if pid == old_pid
    ));
    assert!(restarted.stop_error.is_none());
    let new_pid = restarted.started.pid();
    assert_ne!(new_pid, old_pid);
    assert_eq!(sup.records().read("fetch").unwrap().unwrap().pid, new_pid);

    sup.stop("fetch").await.unwrap();
}

#[tokio::test]
async fn test_restart_of_stopped_server_just_starts() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let restarted = sup.restart("fetch").await.unwrap();
    assert_eq!(restarted.previous, Some(Stopped::NotRunning));
    assert!(matches!(restarted.started, Started::Spawned { .. }));

    sup.stop("fetch").await.unwrap();
}

#[tokio::test]
async fn test_stop_with_stale_record_cleans_up() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let mut stale = ProcessRecord::new("fetch", i32::MAX as u32 - 11);
    stale.start_ticks = Some(1);
    sup.records().write(&stale).unwrap();

    let stopped = sup.stop("fetch").await.unwrap();
    assert_eq!(stopped, Stopped::AlreadyStopped { pid: stale.pid });
    assert!(sup.records().read("fetch").unwrap().is_none());
}

#[tokio::test]
async fn test_child_environment_and_working_directory() {
    let dir = create_test_dir();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    let mut spec = ServerSpec::new("env", "echo \"$GREETING from $(pwd)\"; sleep 30")
        .with_env("GREETING", "hello world");
    spec.working_directory = Some(work.clone());
    let sup = supervisor(dir.path(), vec![spec]);

    sup.start("env").await.unwrap();
    let log = sup.ctx().log_file("env").unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    let mut content = String::new();
    while std::time::Instant::now() < deadline {
        content = std::fs::read_to_string(&log).unwrap_or_default();
        if content.contains("hello world from") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    sup.stop("env").await.unwrap();

    assert!(content.contains("starting 'env'"), "log: {}", content);
    assert!(content.contains("hello world from"), "log: {}", content);
    assert!(content.contains("work"), "log: {}", content);
}

#[tokio::test]
async fn test_start_all_and_stop_all() {
    let dir = create_test_dir();
    let sup = supervisor(
        dir.path(),
        vec![
            ServerSpec::new("a", "sleep 30"),
            ServerSpec::new("b", "sleep 30"),
            ServerSpec::new("off", "sleep 30").disabled(),
        ],
    );

    let started = sup.start_all().await;
    assert!(started.is_success());
    assert_eq!(started.len(), 2);
    assert!(started.get("off").is_none());
    assert_eq!(sup.records().list().unwrap().len(), 2);

    let stopped = sup.stop_all().await;
    assert!(stopped.is_success());
    assert!(sup.records().list().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_starts_spawn_once() {
    let dir = create_test_dir();
    let sup = supervisor(dir.path(), vec![ServerSpec::new("fetch", "sleep 30")]);

    let (a, b) = tokio::join!(sup.start("fetch"), sup.start("fetch"));
    let (a, b) = (a.unwrap(), b.unwrap());

    let spawned = [&a, &b]
        .iter()
        .filter(|s| matches!(s, Started::Spawned { .. }))
        .count();
    assert_eq!(spawned, 1, "exactly one start should spawn: {:?} {:?}", a, b);
    assert_eq!(a.pid(), b.pid());

    sup.stop("fetch").await.unwrap();
}
