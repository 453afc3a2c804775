use super::HostInfo;
use crate::state::atomic_write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `host_info.json` in the state directory. Advisory: every failure here is
/// logged and otherwise ignored, and the file is safe to delete.
#[derive(Debug, Clone)]
pub struct HostCache {
    path: PathBuf,
}

impl HostCache {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("host_info.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<HostInfo> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!("Ignoring unreadable {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Cached entry younger than `ttl`, if any.
    pub fn load_fresh(&self, ttl: Duration) -> Option<HostInfo> {
        self.load().filter(|info| info.is_fresh(ttl))
    }

    pub fn store(&self, info: &HostInfo) {
        let result = serde_json::to_string_pretty(info)
            .map_err(crate::error::Error::from)
            .and_then(|json| atomic_write(&self.path, &json));
        if let Err(e) = result {
            tracing::warn!("Failed to write {}: {}", self.path.display(), e);
        }
    }
}
