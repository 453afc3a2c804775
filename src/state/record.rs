use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted record of a spawned server process.
///
/// `start_ticks`, `boot_id` and `token` form the fingerprint used to tell
/// the original process apart from an unrelated one that reused its PID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub name: String,

    pub pid: u32,

    pub started_at: DateTime<Utc>,

    /// Rendered command line, for display only
    #[serde(default)]
    pub command: String,

    /// Sentinel exported to the child as `MCPM_SUPERVISOR_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Kernel start time of `pid` in clock ticks since boot (Linux)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_ticks: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl ProcessRecord {
    pub fn new(name: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
            started_at: Utc::now(),
            command: String::new(),
            token: None,
            start_ticks: None,
            boot_id: None,
            log_file: None,
        }
    }

    /// Age of the record relative to now.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.started_at)
    }
}

/// Written when the daemon gives up on a crash-looping server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMarker {
    pub name: String,
    pub failures: u32,
    pub marked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Written when the daemon failed to spawn a server and will try again.
/// With no record on disk, this is what keeps the entry "should run".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRestart {
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Random 128-bit hex token identifying processes spawned by this supervisor.
pub fn new_token() -> String {
    format!("{:032x}", rand::thread_rng().gen::<u128>())
}
