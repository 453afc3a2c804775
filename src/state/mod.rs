//! Durable per-server state under the state directory.
//!
//! ```text
//! <state_dir>/
//!   records/<name>.json   ProcessRecord for each spawned server
//!   failed/<name>.json    FailureMarker for servers the daemon gave up on
//!   pending/<name>.json   PendingRestart after a spawn failure in the daemon
//!   locks/<name>.lock     cross-process per-name lock files
//! ```
//!
//! Every file is written atomically (temp file, fsync, rename), so a crash
//! mid-write leaves either the old or the new content.

mod record;
mod store;

pub use record::{new_token, FailureMarker, PendingRestart, ProcessRecord};
pub use store::RecordStore;

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Write `contents` to `path` via a sibling temp file and rename.
pub fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Filesystem(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| Error::Filesystem(format!("Failed to create temp file: {}", e)))?;

    file.write_all(contents.as_bytes())
        .map_err(|e| Error::Filesystem(format!("Failed to write temp file: {}", e)))?;

    // Ensure data is on disk before rename
    file.sync_all()
        .map_err(|e| Error::Filesystem(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Filesystem(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

/// Map a server name to a file stem.
///
/// Path separators and leading dots are rejected outright. Other unsafe
/// characters become `_`, and a hash of the original name is appended so
/// that `a b` and `a_b` never share a file.
pub fn sanitize_name_for_path(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Config("Server name cannot be empty".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(Error::Config(format!(
            "Server name '{}' contains path separators",
            name
        )));
    }
    if name.starts_with('.') {
        return Err(Error::Config(format!(
            "Server name '{}' cannot start with a dot",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect();

    if sanitized == name {
        Ok(sanitized)
    } else {
        Ok(format!("{}-{:08x}", sanitized, fnv1a(name) as u32))
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325u64, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}
