use super::{atomic_write, sanitize_name_for_path, FailureMarker, PendingRestart, ProcessRecord};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// File-per-server persistence for process records and failure markers.
///
/// Callers serialize access per name through the supervisor's name lock;
/// the store itself only guarantees that each file write is atomic.
#[derive(Debug, Clone)]
pub struct RecordStore {
    records_dir: PathBuf,
    failed_dir: PathBuf,
    pending_dir: PathBuf,
}

impl RecordStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            records_dir: state_dir.join("records"),
            failed_dir: state_dir.join("failed"),
            pending_dir: state_dir.join("pending"),
        }
    }

    pub fn record_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .records_dir
            .join(format!("{}.json", sanitize_name_for_path(name)?)))
    }

    fn marker_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .failed_dir
            .join(format!("{}.json", sanitize_name_for_path(name)?)))
    }

    fn pending_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .pending_dir
            .join(format!("{}.json", sanitize_name_for_path(name)?)))
    }

    /// Read the record for `name`. A record that cannot be parsed is moved
    /// aside as `<file>.corrupt` and reported as absent.
    pub fn read(&self, name: &str) -> Result<Option<ProcessRecord>> {
        let path = self.record_path(name)?;
        let record: Option<ProcessRecord> = read_json(&path)?;
        match record {
            Some(r) if r.name != name => {
                tracing::warn!(
                    "Record {} belongs to '{}', not '{}'; ignoring",
                    path.display(),
                    r.name,
                    name
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn write(&self, record: &ProcessRecord) -> Result<()> {
        let path = self.record_path(&record.name)?;
        let json = serde_json::to_string_pretty(record)?;
        atomic_write(&path, &json)?;
        tracing::debug!("Wrote record for '{}' (PID {})", record.name, record.pid);
        Ok(())
    }

    /// Delete the record for `name`. Returns false if there was none.
    pub fn remove(&self, name: &str) -> Result<bool> {
        remove_file(&self.record_path(name)?)
    }

    /// All readable records, sorted by name.
    pub fn list(&self) -> Result<Vec<ProcessRecord>> {
        let mut records: Vec<ProcessRecord> = list_json(&self.records_dir)?;
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    pub fn read_failure(&self, name: &str) -> Result<Option<FailureMarker>> {
        read_json(&self.marker_path(name)?)
    }

    pub fn mark_failed(&self, marker: &FailureMarker) -> Result<()> {
        let path = self.marker_path(&marker.name)?;
        atomic_write(&path, &serde_json::to_string_pretty(marker)?)
    }

    pub fn clear_failure(&self, name: &str) -> Result<bool> {
        remove_file(&self.marker_path(name)?)
    }

    pub fn read_pending(&self, name: &str) -> Result<Option<PendingRestart>> {
        read_json(&self.pending_path(name)?)
    }

    pub fn mark_pending(&self, pending: &PendingRestart) -> Result<()> {
        let path = self.pending_path(&pending.name)?;
        atomic_write(&path, &serde_json::to_string_pretty(pending)?)
    }

    pub fn clear_pending(&self, name: &str) -> Result<bool> {
        remove_file(&self.pending_path(name)?)
    }

    pub fn list_failures(&self) -> Result<Vec<FailureMarker>> {
        let mut markers: Vec<FailureMarker> = list_json(&self.failed_dir)?;
        markers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(markers)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Filesystem(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let aside = path.with_extension("json.corrupt");
            tracing::warn!(
                "Unreadable state file {} ({}), moving to {}",
                path.display(),
                e,
                aside.display()
            );
            fs::rename(path, &aside).map_err(|e| {
                Error::Filesystem(format!("Failed to move {} aside: {}", path.display(), e))
            })?;
            Ok(None)
        }
    }
}

fn list_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::Filesystem(format!(
                "Failed to list {}: {}",
                dir.display(),
                e
            )))
        }
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(value) = read_json(&path)? {
            out.push(value);
        }
    }
    Ok(out)
}

fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Filesystem(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
