// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(mcpm::config::error))]
    Config(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(mcpm::config::validation),
        help("Run `mcpm validate` for detailed validation errors")
    )]
    Validation(String),

    #[error("Server not found: {0}")]
    #[diagnostic(
        code(mcpm::server::not_found),
        help("List configured servers with `mcpm status` or `mcpm validate`")
    )]
    ServerNotFound(String),

    #[error("Duplicate server name '{0}' in configuration")]
    #[diagnostic(
        code(mcpm::config::duplicate),
        help("Every entry under 'servers:' must have a unique name")
    )]
    DuplicateServer(String),

    #[error("Invalid server entry #{index}{}: {reason}",
        .name.as_ref().map(|n| format!(" ('{}')", n)).unwrap_or_default()
    )]
    #[diagnostic(code(mcpm::config::invalid_entry))]
    InvalidEntry {
        index: usize,
        name: Option<String>,
        reason: String,
    },

    #[error("Server '{name}' failed to start: {reason}")]
    #[diagnostic(
        code(mcpm::server::spawn_failed),
        help("Check the server log under the log directory and verify the command exists")
    )]
    SpawnFailed { name: String, reason: String },

    #[error("Failed to signal PID {pid}: {reason}")]
    #[diagnostic(code(mcpm::process::signal))]
    Signal { pid: u32, reason: String },

    #[error("Host resolution failed: {0}")]
    #[diagnostic(code(mcpm::host::resolution))]
    Resolution(String),

    #[error("Daemon error: {0}")]
    #[diagnostic(code(mcpm::daemon::error))]
    Daemon(String),

    #[error("Another daemon is already supervising this state directory (PID {})",
        .pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
    )]
    #[diagnostic(
        code(mcpm::daemon::already_running),
        help("Stop the running daemon first, or use a different --state-dir")
    )]
    DaemonAlreadyRunning { pid: Option<u32> },

    #[error("Server '{name}' has a record for PID {pid} whose liveness cannot be verified")]
    #[diagnostic(
        code(mcpm::record::conflict),
        help("Run `mcpm stop {name}` or remove the record file if the process is gone")
    )]
    RecordConflict { name: String, pid: u32 },

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(mcpm::filesystem::error))]
    Filesystem(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServerNotFound(name) => Some(format!(
                "'{}' is not defined in the config. Check the 'servers:' list or run 'mcpm validate'.",
                name
            )),
            Error::Config(msg) if msg.contains("Could not find") => Some(
                "Create mcp_servers.yaml in this directory (or config/), or pass --config <path>."
                    .to_string(),
            ),
            Error::Config(_) | Error::Validation(_) | Error::InvalidEntry { .. } => {
                Some("Validate your config with: mcpm validate".to_string())
            }
            Error::DuplicateServer(name) => Some(format!(
                "Rename or remove one of the entries called '{}'.",
                name
            )),
            Error::SpawnFailed { name, .. } => Some(format!(
                "Check the log file for '{}' and make sure the launch command works in a shell.",
                name
            )),
            Error::RecordConflict { name, .. } => Some(format!(
                "Run 'mcpm stop {}' to clear the record.",
                name
            )),
            Error::DaemonAlreadyRunning { pid: Some(pid) } => Some(format!(
                "A daemon (PID {}) already owns this state directory.",
                pid
            )),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }

    /// True for errors that mean "the entry itself is misconfigured".
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Validation(_)
                | Error::ServerNotFound(_)
                | Error::DuplicateServer(_)
                | Error::InvalidEntry { .. }
        )
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
#[cfg(unix)]
pub fn validate_pid(pid: u32, server_name: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for server '{}' (refers to process group, not a process)",
                server_name
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "refusing to operate on PID 1 (init) for server '{}'",
                server_name
            ),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for server '{}', cannot convert safely",
                pid, server_name
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// Same as validate_pid but allows PID 1 for read-only existence checks.
#[cfg(unix)]
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}
