use super::{EntryError, RawServer, ServerStore, Settings};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File names searched for, in order, in each candidate directory.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["mcp_servers.yaml", "mcp_servers.yml", "mcp_servers.json"];

#[derive(Debug, Default, Deserialize)]
struct Document {
    #[serde(default)]
    servers: Option<serde_yaml::Value>,
    #[serde(default)]
    settings: Settings,
}

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Find config file starting from current directory
    pub fn find_config_file(&self) -> Result<PathBuf> {
        let current_dir = std::env::current_dir()?;
        Self::find_config_in_dir(&current_dir)
    }

    /// Look in `dir`, then `dir/config`, then walk up through the parents.
    pub fn find_config_in_dir(dir: &Path) -> Result<PathBuf> {
        let mut current = Some(dir);
        while let Some(d) = current {
            for candidate_dir in [d.to_path_buf(), d.join("config")] {
                for name in CONFIG_FILE_NAMES {
                    let path = candidate_dir.join(name);
                    if path.is_file() {
                        return Ok(path);
                    }
                }
            }
            current = d.parent();
        }

        Err(Error::Config(
            "Could not find mcp_servers.yaml (or .yml/.json) in current directory, config/, or any parent"
                .to_string(),
        ))
    }

    /// Load the server store from a file path
    pub fn load_store<P: AsRef<Path>>(&self, path: P) -> Result<ServerStore> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let base_dir = config_dir(path);
        Ok(self
            .parse_store(&content, &base_dir)?
            .with_path(path.to_path_buf()))
    }

    /// Parse a YAML (or JSON) document. Relative paths resolve against `base_dir`.
    ///
    /// Document-level problems fail the load; a bad entry is recorded in
    /// [`ServerStore::entry_errors`] and the remaining entries still load.
    pub fn parse_store(&self, content: &str, base_dir: &Path) -> Result<ServerStore> {
        let doc: Document = if content.trim().is_empty() {
            Document::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| Error::Parse(format!("Failed to parse config: {}", e)))?
        };

        let entries = match doc.servers {
            None | Some(serde_yaml::Value::Null) => Vec::new(),
            Some(serde_yaml::Value::Sequence(seq)) => seq,
            Some(_) => {
                return Err(Error::Validation(
                    "'servers' must be a list of server entries".to_string(),
                ))
            }
        };

        let root = project_root(base_dir);
        let mut servers = Vec::new();
        let mut entry_errors = Vec::new();
        let mut warnings = Vec::new();

        for (index, value) in entries.into_iter().enumerate() {
            let name_hint = value
                .get("name")
                .and_then(|n| n.as_str())
                .map(str::to_string);
            let enabled_hint = value.get("enabled").and_then(|e| e.as_bool());
            let raw: RawServer = match serde_yaml::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    entry_errors.push(EntryError {
                        index,
                        name: name_hint,
                        enabled: enabled_hint,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            match raw.into_spec(index, base_dir, &root) {
                Ok((spec, entry_warnings)) => {
                    warnings.extend(entry_warnings);
                    servers.push(spec);
                }
                Err(Error::InvalidEntry {
                    index,
                    name,
                    reason,
                }) => entry_errors.push(EntryError {
                    index,
                    name,
                    enabled: enabled_hint,
                    reason,
                }),
                Err(e) => return Err(e),
            }
        }

        for entry in &entry_errors {
            tracing::warn!("{}", entry.to_error());
        }

        ServerStore::build(None, doc.settings, servers, entry_errors, warnings)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory containing the config file (current directory for bare names).
pub fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// A config kept under `<project>/config/` belongs to `<project>`.
pub fn project_root(config_dir: &Path) -> PathBuf {
    if config_dir.file_name().is_some_and(|n| n == "config") {
        if let Some(parent) = config_dir.parent() {
            return parent.to_path_buf();
        }
    }
    config_dir.to_path_buf()
}
