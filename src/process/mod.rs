//! OS process handling behind a single [`ProcessBackend`] trait.
//!
//! The Unix backend spawns each server in its own session via `/bin/sh -c`,
//! signals the whole process group on stop, and checks liveness with a
//! fingerprint so a recycled PID is never mistaken for the original server.
//! A reduced backend covers non-Unix hosts.

#[cfg(not(unix))]
mod fallback;
#[cfg(unix)]
mod unix;

#[cfg(not(unix))]
pub use fallback::FallbackBackend;
#[cfg(unix)]
pub use unix::UnixBackend;

use crate::error::Result;
use crate::state::ProcessRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable carrying the per-spawn sentinel token.
pub const TOKEN_ENV: &str = "MCPM_SUPERVISOR_TOKEN";

/// Environment variable naming the server a child was spawned for.
pub const SERVER_NAME_ENV: &str = "MCPM_SERVER_NAME";

/// How long to wait for a process to disappear after SIGKILL.
pub const KILL_WAIT: Duration = Duration::from_secs(2);

/// Result of checking a recorded PID against the running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The recorded process is running.
    Alive,
    /// No such process (or only a zombie remains).
    Dead,
    /// The PID is running but belongs to a different process.
    Reused,
    /// The PID exists but could not be verified.
    Unknown,
}

impl Liveness {
    /// True when the record no longer describes a running server.
    pub fn is_stale(&self) -> bool {
        matches!(self, Liveness::Dead | Liveness::Reused)
    }
}

/// Everything needed to launch one server.
#[derive(Debug, Clone)]
pub struct SpawnRequest<'a> {
    pub name: &'a str,
    pub command: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub working_directory: Option<&'a Path>,
    pub log_file: &'a Path,
    pub token: &'a str,
}

/// A freshly spawned process and the fingerprint captured right after spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spawned {
    pub pid: u32,
    pub start_ticks: Option<u64>,
    pub boot_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period after the polite signal.
    Terminated,
    /// Needed the forced kill.
    Killed,
    /// Was already gone when the first signal was sent.
    AlreadyExited,
}

#[async_trait]
pub trait ProcessBackend: Send + Sync {
    /// Launch the command detached from the supervisor's lifetime.
    async fn spawn(&self, request: SpawnRequest<'_>) -> Result<Spawned>;

    /// Check whether `record` still identifies a live process spawned by us.
    fn liveness(&self, record: &ProcessRecord) -> Liveness;

    /// Polite termination, wait up to `grace`, then forced kill.
    async fn terminate(&self, record: &ProcessRecord, grace: Duration) -> Result<StopOutcome>;
}

/// The backend for the platform this binary was built for.
pub fn default_backend() -> Arc<dyn ProcessBackend> {
    #[cfg(unix)]
    {
        Arc::new(UnixBackend::new())
    }
    #[cfg(not(unix))]
    {
        Arc::new(FallbackBackend::new())
    }
}

/// Append the spawn header to the server log and return handles for the
/// child's stdout and stderr.
pub(crate) fn open_log(
    log_file: &Path,
    name: &str,
    command: &str,
) -> std::io::Result<(std::fs::File, std::fs::File)> {
    use std::io::Write;

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    writeln!(
        file,
        "=== {} starting '{}' ===\n$ {}",
        chrono::Utc::now().to_rfc3339(),
        name,
        command
    )?;
    let stderr = file.try_clone()?;
    Ok((file, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_states() {
        assert!(Liveness::Dead.is_stale());
        assert!(Liveness::Reused.is_stale());
        assert!(!Liveness::Alive.is_stale());
        assert!(!Liveness::Unknown.is_stale());
    }

    #[test]
    fn open_log_appends_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs/a.log");
        open_log(&log, "a", "echo 1").unwrap();
        open_log(&log, "a", "echo 2").unwrap();
        let content = std::fs::read_to_string(&log).unwrap();
        assert_eq!(content.matches("starting 'a'").count(), 2);
        assert!(content.contains("$ echo 2"));
    }
}
