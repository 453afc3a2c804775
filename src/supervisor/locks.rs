//! Per-name mutual exclusion.
//!
//! Two layers: an in-process async mutex so tasks in one supervisor queue up
//! without blocking threads, and an fs2 advisory lock on
//! `<state_dir>/locks/<name>.lock` so separate `mcpm` invocations and the
//! daemon never act on the same entry at once. Different names never
//! contend.

use crate::error::{Error, Result};
use crate::state::sanitize_name_for_path;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Held for the duration of one operation on one name. Dropping it releases
/// both the file lock and the in-process mutex.
pub struct NameGuard {
    name: String,
    file: File,
    _local: tokio::sync::OwnedMutexGuard<()>,
}

impl NameGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::debug!("Failed to unlock '{}': {}", self.name, e);
        }
    }
}

#[derive(Clone)]
pub struct NameLocks {
    dir: PathBuf,
    local: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl NameLocks {
    pub fn new(lock_dir: &Path) -> Self {
        Self {
            dir: lock_dir.to_path_buf(),
            local: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn local_mutex(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.local
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn open(&self, name: &str) -> Result<File> {
        let path = self.dir.join(format!("{}.lock", sanitize_name_for_path(name)?));
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Filesystem(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Filesystem(format!("Cannot open '{}': {}", path.display(), e)))
    }

    /// Wait until `name` is free in this process and in every other one.
    pub async fn acquire(&self, name: &str) -> Result<NameGuard> {
        let local = self.local_mutex(name).lock_owned().await;
        let file = self.open(name)?;

        let owned = name.to_string();
        let file = tokio::task::spawn_blocking(move || {
            file.lock_exclusive()
                .map(|_| file)
                .map_err(|e| Error::Filesystem(format!("Cannot lock '{}': {}", owned, e)))
        })
        .await
        .map_err(|e| Error::Filesystem(format!("Lock task failed: {}", e)))??;

        Ok(NameGuard {
            name: name.to_string(),
            file,
            _local: local,
        })
    }

    /// Take the lock only if nobody holds it right now.
    pub fn try_acquire(&self, name: &str) -> Result<Option<NameGuard>> {
        let local = match self.local_mutex(name).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => return Ok(None),
        };
        let file = self.open(name)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(NameGuard {
                name: name.to_string(),
                file,
                _local: local,
            })),
            Err(_) => Ok(None),
        }
    }
}
