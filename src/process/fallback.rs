//! Process handling for hosts without POSIX signals.
//!
//! Liveness is PID existence only (`tasklist`), and termination goes through
//! `taskkill`, first without and then with `/F`.

use super::{
    open_log, Liveness, ProcessBackend, SpawnRequest, Spawned, StopOutcome, KILL_WAIT,
    SERVER_NAME_ENV, TOKEN_ENV,
};
use crate::error::{Error, Result};
use crate::state::ProcessRecord;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Default, Clone)]
pub struct FallbackBackend;

impl FallbackBackend {
    pub fn new() -> Self {
        Self
    }
}

fn pid_exists(pid: u32) -> Option<bool> {
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid), "/NH", "/FO", "CSV"])
        .output()
        .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(stdout.contains(&format!("\"{}\"", pid)))
}

async fn taskkill(pid: u32, force: bool) -> Result<()> {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        cmd.arg("/F");
    }
    let status = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Signal {
            pid,
            reason: e.to_string(),
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Signal {
            pid,
            reason: format!("taskkill exited with {}", status),
        })
    }
}

async fn wait_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if pid_exists(pid) == Some(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    pid_exists(pid) == Some(false)
}

#[async_trait]
impl ProcessBackend for FallbackBackend {
    async fn spawn(&self, req: SpawnRequest<'_>) -> Result<Spawned> {
        let spawn_err = |reason: String| Error::SpawnFailed {
            name: req.name.to_string(),
            reason,
        };
        let (stdout, stderr) = open_log(req.log_file, req.name, req.command)
            .map_err(|e| spawn_err(format!("cannot open log file: {}", e)))?;

        let mut cmd = Command::new("cmd");
        cmd.arg("/C")
            .arg(req.command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .envs(req.env.iter())
            .env(TOKEN_ENV, req.token)
            .env(SERVER_NAME_ENV, req.name)
            .kill_on_drop(false);
        if let Some(dir) = req.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| spawn_err(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_err("process exited before its PID was read".to_string()))?;
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(Spawned {
            pid,
            start_ticks: None,
            boot_id: None,
        })
    }

    fn liveness(&self, record: &ProcessRecord) -> Liveness {
        match pid_exists(record.pid) {
            Some(true) => Liveness::Alive,
            Some(false) => Liveness::Dead,
            None => Liveness::Unknown,
        }
    }

    async fn terminate(&self, record: &ProcessRecord, grace: Duration) -> Result<StopOutcome> {
        if pid_exists(record.pid) == Some(false) {
            return Ok(StopOutcome::AlreadyExited);
        }
        if taskkill(record.pid, false).await.is_ok() && wait_gone(record.pid, grace).await {
            return Ok(StopOutcome::Terminated);
        }
        taskkill(record.pid, true).await?;
        wait_gone(record.pid, KILL_WAIT).await;
        Ok(StopOutcome::Killed)
    }
}
