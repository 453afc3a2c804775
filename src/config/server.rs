//! Server entry configuration types.
//!
//! [`RawServer`] is the permissive serde view of one element of `servers:`.
//! It is converted into an immutable [`ServerSpec`] by
//! [`RawServer::into_spec`], which applies defaults and resolves paths.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BIND_HOST: &str = "localhost";
pub const DEFAULT_ALLOW_ORIGIN: &str = "*";

/// How the wrapped executable is packaged. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    Uvx,
    Node,
    SourceCode,
    Docker,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Uvx => "uvx",
            ServerKind::Node => "node",
            ServerKind::SourceCode => "source_code",
            ServerKind::Docker => "docker",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uvx" => Ok(ServerKind::Uvx),
            "node" | "npx" => Ok(ServerKind::Node),
            "source_code" | "source" => Ok(ServerKind::SourceCode),
            "docker" => Ok(ServerKind::Docker),
            other => Err(format!(
                "unknown server type '{}' (expected uvx, node, source_code or docker)",
                other
            )),
        }
    }
}

/// A port may be written as a number or a quoted string in JSON configs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    fn to_port(&self) -> std::result::Result<u16, String> {
        let n = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("port '{}' is not a number", s))?,
        };
        if (1..=65535).contains(&n) {
            Ok(n as u16)
        } else {
            Err(format!("port {} is out of range (1-65535)", n))
        }
    }
}

/// Serde view of a `servers:` element. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServer {
    pub name: Option<String>,

    pub enabled: Option<bool>,

    #[serde(rename = "type")]
    pub kind: Option<String>,

    #[serde(alias = "bind_host")]
    pub sse_host: Option<String>,

    #[serde(alias = "bind_port", alias = "port")]
    pub sse_port: Option<PortValue>,

    pub allow_origin: Option<String>,

    #[serde(alias = "launch_template")]
    pub sse_start_command: Option<String>,

    #[serde(alias = "raw_command")]
    pub start_command: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, serde_yaml::Value>,

    #[serde(alias = "path")]
    pub working_directory: Option<String>,

    /// Source checkout for `source_code` servers: `<root>/mcp-servers/<repo-name>/<subdir>`
    pub repo: Option<String>,
    pub subdir: Option<String>,
}

/// One configured background server. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSpec {
    pub name: String,
    pub enabled: bool,
    pub kind: Option<ServerKind>,
    pub bind_host: String,
    pub bind_port: Option<u16>,
    pub allow_origin: String,
    pub launch_template: Option<String>,
    pub raw_command: Option<String>,
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl ServerSpec {
    /// Minimal enabled spec running `raw_command` directly.
    pub fn new(name: impl Into<String>, raw_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind: None,
            bind_host: DEFAULT_BIND_HOST.to_string(),
            bind_port: None,
            allow_origin: DEFAULT_ALLOW_ORIGIN.to_string(),
            launch_template: None,
            raw_command: Some(raw_command.into()),
            env: BTreeMap::new(),
            working_directory: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.launch_template = Some(template.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_port = Some(port);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind_label(&self) -> &'static str {
        self.kind.map(|k| k.as_str()).unwrap_or("-")
    }
}

impl RawServer {
    /// Apply defaults and resolve paths. `base_dir` is the directory relative
    /// paths are resolved against; `project_root` anchors `repo`/`subdir`.
    ///
    /// Returns the spec plus non-fatal warnings.
    pub fn into_spec(
        self,
        index: usize,
        base_dir: &Path,
        project_root: &Path,
    ) -> Result<(ServerSpec, Vec<String>)> {
        let invalid = |name: Option<String>, reason: String| Error::InvalidEntry {
            index,
            name,
            reason,
        };
        let mut warnings = Vec::new();

        let name = match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => return Err(invalid(None, "missing 'name'".to_string())),
        };
        if name.starts_with('.') || name.chars().any(|c| matches!(c, '/' | '\\') || c.is_control()) {
            return Err(invalid(
                Some(name),
                "name must not start with '.' or contain path separators".to_string(),
            ));
        }

        let launch_template = non_empty(self.sse_start_command);
        let raw_command = non_empty(self.start_command);
        if launch_template.is_none() && raw_command.is_none() {
            return Err(invalid(
                Some(name),
                "needs 'sse_start_command' or 'start_command'".to_string(),
            ));
        }

        let kind = match self.kind.as_deref() {
            None => None,
            Some(k) => match k.parse::<ServerKind>() {
                Ok(kind) => Some(kind),
                Err(msg) => {
                    warnings.push(format!("server '{}': {}", name, msg));
                    None
                }
            },
        };

        let bind_port = match &self.sse_port {
            None => None,
            Some(p) => Some(p.to_port().map_err(|r| invalid(Some(name.clone()), r))?),
        };

        let mut env = BTreeMap::new();
        for (key, value) in self.env {
            let value = scalar_to_string(&value).ok_or_else(|| {
                invalid(
                    Some(name.clone()),
                    format!("env '{}' must be a string, number or boolean", key),
                )
            })?;
            env.insert(key, value);
        }

        let working_directory = match non_empty(self.working_directory) {
            Some(dir) => Some(resolve_path(&dir, base_dir)),
            None => match (kind, &self.repo, &self.subdir) {
                (Some(ServerKind::SourceCode), Some(repo), subdir) => {
                    Some(source_checkout_dir(project_root, repo, subdir.as_deref()))
                }
                (Some(ServerKind::SourceCode), None, _) => {
                    warnings.push(format!(
                        "server '{}': source_code server has neither 'path' nor 'repo'",
                        name
                    ));
                    None
                }
                _ => None,
            },
        };

        let spec = ServerSpec {
            name,
            enabled: self.enabled.unwrap_or(true),
            kind,
            bind_host: non_empty(self.sse_host).unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            bind_port,
            allow_origin: non_empty(self.allow_origin)
                .unwrap_or_else(|| DEFAULT_ALLOW_ORIGIN.to_string()),
            launch_template,
            raw_command,
            env,
            working_directory,
        };
        Ok((spec, warnings))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Expand `~/` and resolve relative paths against `base_dir`.
fn resolve_path(raw: &str, base_dir: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

fn source_checkout_dir(project_root: &Path, repo: &str, subdir: Option<&str>) -> PathBuf {
    let repo_name = repo
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(repo)
        .trim_end_matches(".git");
    let base = project_root.join("mcp-servers").join(repo_name);
    match subdir {
        Some(sub) if sub != "." && !sub.is_empty() => base.join(sub),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<(ServerSpec, Vec<String>)> {
        let raw: RawServer = serde_yaml::from_str(yaml).unwrap();
        raw.into_spec(0, Path::new("/srv/cfg"), Path::new("/srv"))
    }

    #[test]
    fn applies_defaults() {
        let (spec, warnings) = parse("name: fetch\nstart_command: uvx mcp-server-fetch\n").unwrap();
        assert!(spec.enabled);
        assert_eq!(spec.bind_host, "localhost");
        assert_eq!(spec.allow_origin, "*");
        assert_eq!(spec.bind_port, None);
        assert!(spec.working_directory.is_none());
        assert!(warnings.is_empty());
    }

    #[test]
    fn accepts_aliases_and_string_port() {
        let (spec, _) = parse(
            "name: a\nbind_host: 0.0.0.0\nbind_port: \"23001\"\nlaunch_template: x {sse_port}\n",
        )
        .unwrap();
        assert_eq!(spec.bind_host, "0.0.0.0");
        assert_eq!(spec.bind_port, Some(23001));
        assert_eq!(spec.launch_template.as_deref(), Some("x {sse_port}"));
    }

    #[test]
    fn missing_name_is_invalid() {
        let err = parse("start_command: x\n").unwrap_err();
        assert!(matches!(err, Error::InvalidEntry { name: None, .. }));
    }

    #[test]
    fn path_like_name_is_invalid() {
        assert!(parse("name: ../etc\nstart_command: x\n").is_err());
        assert!(parse("name: a/b\nstart_command: x\n").is_err());
    }

    #[test]
    fn missing_both_commands_is_invalid() {
        let err = parse("name: a\nsse_host: 0.0.0.0\n").unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn out_of_range_port_is_invalid() {
        assert!(parse("name: a\nstart_command: x\nsse_port: 70000\n").is_err());
        assert!(parse("name: a\nstart_command: x\nsse_port: 0\n").is_err());
    }

    #[test]
    fn unknown_type_is_a_warning() {
        let (spec, warnings) = parse("name: a\nstart_command: x\ntype: cobol\n").unwrap();
        assert!(spec.kind.is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn env_scalars_are_stringified() {
        let (spec, _) =
            parse("name: a\nstart_command: x\nenv:\n  PORT: 8080\n  DEBUG: true\n  KEY: v\n").unwrap();
        assert_eq!(spec.env["PORT"], "8080");
        assert_eq!(spec.env["DEBUG"], "true");
        assert_eq!(spec.env["KEY"], "v");
    }

    #[test]
    fn nested_env_value_is_invalid() {
        assert!(parse("name: a\nstart_command: x\nenv:\n  K:\n    nested: 1\n").is_err());
    }

    #[test]
    fn relative_working_directory_resolves_against_config_dir() {
        let (spec, _) = parse("name: a\nstart_command: x\npath: servers/a\n").unwrap();
        assert_eq!(spec.working_directory, Some(PathBuf::from("/srv/cfg/servers/a")));
    }

    #[test]
    fn source_code_derives_checkout_dir() {
        let (spec, _) = parse(
            "name: a\nstart_command: x\ntype: source_code\nrepo: https://github.com/o/tools.git\nsubdir: src/a\n",
        )
        .unwrap();
        assert_eq!(
            spec.working_directory,
            Some(PathBuf::from("/srv/mcp-servers/tools/src/a"))
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        assert!(parse("name: a\nstart_command: x\nfuture_field: [1, 2]\n").is_ok());
    }
}
