use super::{
    open_log, Liveness, ProcessBackend, SpawnRequest, Spawned, StopOutcome, KILL_WAIT,
    SERVER_NAME_ENV, TOKEN_ENV,
};
use crate::error::{validate_pid, validate_pid_for_check, Error, Result};
use crate::state::ProcessRecord;
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{getpgid, Pid};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone)]
pub struct UnixBackend;

impl UnixBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessBackend for UnixBackend {
    async fn spawn(&self, req: SpawnRequest<'_>) -> Result<Spawned> {
        let spawn_err = |reason: String| Error::SpawnFailed {
            name: req.name.to_string(),
            reason,
        };

        if let Some(dir) = req.working_directory {
            if !dir.is_dir() {
                return Err(spawn_err(format!(
                    "working directory '{}' does not exist",
                    dir.display()
                )));
            }
        }

        let (stdout, stderr) = open_log(req.log_file, req.name, req.command).map_err(|e| {
            spawn_err(format!(
                "cannot open log file {}: {}",
                req.log_file.display(),
                e
            ))
        })?;

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(req.command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .envs(req.env.iter())
            .env(TOKEN_ENV, req.token)
            .env(SERVER_NAME_ENV, req.name)
            .kill_on_drop(false); // Servers outlive the supervisor
        if let Some(dir) = req.working_directory {
            cmd.current_dir(dir);
        }

        // SAFETY: the closure runs in the child between fork() and exec(), where
        // only async-signal-safe functions may be called. setsid() is a single
        // async-signal-safe syscall; the closure allocates nothing and takes no locks.
        // The new session makes the child a process group leader (pgid == pid)
        // and detaches it from the supervisor's controlling terminal.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!("Failed to spawn '{}': {}", req.name, e);
            spawn_err(e.to_string())
        })?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_err("process exited before its PID was read".to_string()))?;

        // The child cannot be reaped before wait() below, so /proc/<pid> is still there.
        let spawned = Spawned {
            pid,
            start_ticks: read_start_ticks(pid),
            boot_id: read_boot_id(),
        };

        // Reap promptly while this runtime is alive; afterwards init adopts it.
        let name = req.name.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(server.name = %name, "PID {} exited: {}", pid, status),
                Err(e) => tracing::debug!(server.name = %name, "wait on PID {} failed: {}", pid, e),
            }
        });

        tracing::debug!(server.name = %req.name, "Spawned PID {}", pid);
        Ok(spawned)
    }

    fn liveness(&self, record: &ProcessRecord) -> Liveness {
        let Some(pid) = validate_pid_for_check(record.pid) else {
            return Liveness::Unknown;
        };
        if record.pid == 1 {
            // init is never one of ours
            return Liveness::Reused;
        }

        classify(record, kill(pid, None))
    }

    async fn terminate(&self, record: &ProcessRecord, grace: Duration) -> Result<StopOutcome> {
        let pid = validate_pid(record.pid, &record.name)?;

        // Spawned children lead their own group. Anything else is signalled alone
        // so a foreign group (possibly our own) is never hit.
        let group = matches!(getpgid(Some(pid)), Ok(pgid) if pgid == pid);
        let signal_err = |e: Errno| Error::Signal {
            pid: record.pid,
            reason: e.to_string(),
        };

        match send(pid, group, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(StopOutcome::AlreadyExited),
            Err(e) => return Err(signal_err(e)),
        }
        tracing::debug!(
            server.name = %record.name,
            "Sent SIGTERM to {} {}",
            if group { "process group" } else { "PID" },
            record.pid
        );

        if wait_for_exit(pid, grace).await {
            if group && killpg(pid, None).is_ok() {
                // Leader gone, stragglers remain in the group
                let _ = killpg(pid, Signal::SIGKILL);
            }
            return Ok(StopOutcome::Terminated);
        }

        tracing::warn!(
            "'{}' (PID {}) did not exit within {:?}, sending SIGKILL",
            record.name,
            record.pid,
            grace
        );
        match send(pid, group, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(signal_err(e)),
        }
        if !wait_for_exit(pid, KILL_WAIT).await {
            tracing::warn!(
                "'{}' (PID {}) still present {:?} after SIGKILL",
                record.name,
                record.pid,
                KILL_WAIT
            );
        }
        Ok(StopOutcome::Killed)
    }
}

/// Turn the result of `kill(pid, 0)` into a liveness verdict.
///
/// EPERM means the PID belongs to another user. Our own children never do,
/// so the fingerprint decides: a mismatch is a reused PID, anything else
/// stays unverifiable.
fn classify(record: &ProcessRecord, signal_check: nix::Result<()>) -> Liveness {
    match signal_check {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Liveness::Dead,
        Err(Errno::EPERM) => {
            return match verify_fingerprint(record) {
                Liveness::Reused => Liveness::Reused,
                _ => {
                    tracing::debug!(
                        "PID {} belongs to another user and its fingerprint is unreadable",
                        record.pid
                    );
                    Liveness::Unknown
                }
            };
        }
        Err(e) => {
            tracing::debug!("kill(0) on PID {} failed: {}", record.pid, e);
            return Liveness::Unknown;
        }
    }

    if is_zombie(record.pid) {
        return Liveness::Dead;
    }

    verify_fingerprint(record)
}

fn send(pid: Pid, group: bool, signal: Signal) -> nix::Result<()> {
    if group {
        killpg(pid, signal)
    } else {
        kill(pid, signal)
    }
}

fn pid_alive(pid: Pid) -> bool {
    !matches!(kill(pid, None), Err(Errno::ESRCH)) && !is_zombie(pid.as_raw() as u32)
}

/// Poll until `pid` is gone or `timeout` elapses. Returns true if it exited.
async fn wait_for_exit(pid: Pid, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !pid_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(target_os = "linux")]
fn verify_fingerprint(record: &ProcessRecord) -> Liveness {
    if let (Some(expected), Some(current)) = (&record.boot_id, read_boot_id()) {
        if *expected != current {
            return Liveness::Reused;
        }
    }

    if let (Some(expected), Some(actual)) = (record.start_ticks, read_start_ticks(record.pid)) {
        return if expected == actual {
            Liveness::Alive
        } else {
            tracing::debug!(
                "PID {} start time {} differs from recorded {}",
                record.pid,
                actual,
                expected
            );
            Liveness::Reused
        };
    }

    if let Some(token) = &record.token {
        match environ_contains(record.pid, TOKEN_ENV, token) {
            Some(true) => return Liveness::Alive,
            Some(false) => return Liveness::Reused,
            None => {}
        }
    }

    Liveness::Alive
}

#[cfg(not(target_os = "linux"))]
fn verify_fingerprint(record: &ProcessRecord) -> Liveness {
    const TOLERANCE_SECS: i64 = 10;

    match process_start_time(record.pid) {
        Some(started) => {
            let diff = (started - record.started_at).num_seconds().abs();
            if diff > TOLERANCE_SECS {
                tracing::debug!(
                    "PID {} started at {} but record says {}",
                    record.pid,
                    started,
                    record.started_at
                );
                Liveness::Reused
            } else {
                Liveness::Alive
            }
        }
        None => Liveness::Alive,
    }
}

/// Parse `/proc/<pid>/stat` after the parenthesized command name, which may
/// itself contain spaces and parentheses.
#[cfg(target_os = "linux")]
fn proc_stat_fields(pid: u32) -> Option<Vec<String>> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let close_paren = stat.rfind(')')?;
    Some(
        stat.get(close_paren + 1..)?
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    )
}

/// Kernel start time of `pid` in clock ticks since boot (field 22 of stat).
#[cfg(target_os = "linux")]
pub(crate) fn read_start_ticks(pid: u32) -> Option<u64> {
    proc_stat_fields(pid)?.get(19)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn read_start_ticks(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
pub(crate) fn read_boot_id() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/random/boot_id")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn read_boot_id() -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    proc_stat_fields(pid)
        .and_then(|f| f.first().cloned())
        .is_some_and(|state| state == "Z" || state == "X")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(pid: u32) -> bool {
    std::process::Command::new("ps")
        .args(["-o", "stat=", "-p", &pid.to_string()])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .is_some_and(|o| String::from_utf8_lossy(&o.stdout).trim_start().starts_with('Z'))
}

/// `Some(true)` if the process environment holds `key=value`, `None` if unreadable.
#[cfg(target_os = "linux")]
fn environ_contains(pid: u32, key: &str, value: &str) -> Option<bool> {
    let environ = std::fs::read(format!("/proc/{}/environ", pid)).ok()?;
    let needle = format!("{}={}", key, value);
    Some(
        environ
            .split(|b| *b == 0)
            .any(|entry| entry == needle.as_bytes()),
    )
}

#[cfg(not(target_os = "linux"))]
fn process_start_time(pid: u32) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::TimeZone;

    let output = std::process::Command::new("ps")
        .args(["-o", "lstart=", "-p", &pid.to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    // lstart is local time, e.g. "Mon Jan  1 12:00:00 2024"
    let lstart = String::from_utf8_lossy(&output.stdout);
    let naive =
        chrono::NaiveDateTime::parse_from_str(lstart.trim(), "%a %b %e %H:%M:%S %Y").ok()?;
    chrono::Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
