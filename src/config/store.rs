//! The loaded, validated set of server entries.

use super::{check_unique_names, entry_warnings, ServerSpec, Settings};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// An entry that failed validation. It does not stop other entries from
/// loading, but any operation naming it fails with the recorded reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryError {
    pub index: usize,
    pub name: Option<String>,
    /// `enabled` as written, when it could be read at all
    pub enabled: Option<bool>,
    pub reason: String,
}

impl EntryError {
    /// Disabled entries are skipped by batch operations even when invalid.
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }

    pub fn to_error(&self) -> Error {
        Error::InvalidEntry {
            index: self.index,
            name: self.name.clone(),
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerStore {
    path: Option<PathBuf>,
    settings: Settings,
    servers: Vec<ServerSpec>,
    entry_errors: Vec<EntryError>,
    warnings: Vec<String>,
}

impl ServerStore {
    /// Build a store from already-constructed specs.
    pub fn from_specs(servers: Vec<ServerSpec>, settings: Settings) -> Result<Self> {
        Self::build(None, settings, servers, Vec::new(), Vec::new())
    }

    pub(crate) fn build(
        path: Option<PathBuf>,
        settings: Settings,
        servers: Vec<ServerSpec>,
        entry_errors: Vec<EntryError>,
        mut warnings: Vec<String>,
    ) -> Result<Self> {
        settings.validate()?;
        check_unique_names(
            servers
                .iter()
                .map(|s| s.name.as_str())
                .chain(entry_errors.iter().filter_map(|e| e.name.as_deref())),
        )?;
        for spec in &servers {
            warnings.extend(entry_warnings(spec));
        }
        Ok(Self {
            path,
            settings,
            servers,
            entry_errors,
            warnings,
        })
    }

    pub(crate) fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// All valid entries in file order.
    pub fn servers(&self) -> &[ServerSpec] {
        &self.servers
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ServerSpec> {
        self.servers.iter().filter(|s| s.enabled)
    }

    pub fn get(&self, name: &str) -> Option<&ServerSpec> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Look up `name`, turning absence into a configuration error.
    pub fn require(&self, name: &str) -> Result<&ServerSpec> {
        if let Some(spec) = self.get(name) {
            return Ok(spec);
        }
        match self
            .entry_errors
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
        {
            Some(entry) => Err(entry.to_error()),
            None => Err(Error::ServerNotFound(name.to_string())),
        }
    }

    pub fn entry_errors(&self) -> &[EntryError] {
        &self.entry_errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
