use crate::config::{config_dir, RestartSettings, ServerStore, Settings};
use crate::error::Result;
use crate::host::{HostCache, HostResolver};
use crate::state::{sanitize_name_for_path, RecordStore};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used for state when `settings.state_dir` is not set.
pub const DEFAULT_STATE_DIR: &str = ".mcpm";

/// Upper bound on a single entry's liveness check during a sweep.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed inside `window`; one more crash marks the entry failed.
    pub max_restarts: u32,
    pub window: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&RestartSettings> for RestartPolicy {
    fn from(s: &RestartSettings) -> Self {
        Self {
            max_restarts: s.max_restarts,
            window: s.get_window(),
            backoff: s.get_backoff(),
            max_backoff: s.get_max_backoff(),
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&RestartSettings::default())
    }
}

/// Command-line values that take precedence over the `settings:` block.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub state_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub poll_interval: Option<Duration>,
    pub grace_period: Option<Duration>,
}

/// Everything an operation needs to know about where and how to run.
/// Built once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct SupervisorContext {
    pub config_path: Option<PathBuf>,
    pub config_root: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub restart: RestartPolicy,
    pub host_override_var: String,
    pub host_cache_ttl: Duration,
    pub probe_timeout: Duration,
}

impl SupervisorContext {
    pub fn from_store(store: &ServerStore, overrides: ContextOverrides) -> Self {
        let config_root = match store.path() {
            Some(path) => config_dir(path),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        let mut ctx = Self::from_settings(store.settings(), &config_root);
        ctx.config_path = store.path().map(Path::to_path_buf);

        if let Some(state_dir) = overrides.state_dir {
            ctx.state_dir = absolutize(&state_dir, &std::env::current_dir().unwrap_or_default());
            if store.settings().log_dir.is_none() {
                ctx.log_dir = ctx.state_dir.join("logs");
            }
        }
        if let Some(log_dir) = overrides.log_dir {
            ctx.log_dir = absolutize(&log_dir, &std::env::current_dir().unwrap_or_default());
        }
        if let Some(interval) = overrides.poll_interval {
            ctx.poll_interval = interval;
        }
        if let Some(grace) = overrides.grace_period {
            ctx.grace_period = grace;
        }
        ctx
    }

    /// Context rooted at `config_root` with paths from `settings`.
    pub fn from_settings(settings: &Settings, config_root: &Path) -> Self {
        let state_dir = settings
            .state_dir
            .as_deref()
            .map(|d| absolutize(Path::new(d), config_root))
            .unwrap_or_else(|| config_root.join(DEFAULT_STATE_DIR));
        let log_dir = settings
            .log_dir
            .as_deref()
            .map(|d| absolutize(Path::new(d), config_root))
            .unwrap_or_else(|| state_dir.join("logs"));

        Self {
            config_path: None,
            config_root: config_root.to_path_buf(),
            state_dir,
            log_dir,
            poll_interval: settings.get_poll_interval(),
            grace_period: settings.get_grace_period(),
            restart: RestartPolicy::from(&settings.restart),
            host_override_var: settings.get_host_override_var().to_string(),
            host_cache_ttl: settings.get_host_cache_ttl(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Defaults with all state kept directly under `state_dir`.
    pub fn for_state_dir(state_dir: &Path) -> Self {
        let mut ctx = Self::from_settings(&Settings::default(), state_dir);
        ctx.state_dir = state_dir.to_path_buf();
        ctx.log_dir = state_dir.join("logs");
        ctx
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn records(&self) -> RecordStore {
        RecordStore::new(&self.state_dir)
    }

    pub fn log_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self
            .log_dir
            .join(format!("{}.log", sanitize_name_for_path(name)?)))
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    pub fn daemon_lock_path(&self) -> PathBuf {
        self.state_dir.join("daemon.lock")
    }

    pub fn daemon_snapshot_path(&self) -> PathBuf {
        self.state_dir.join("daemon.json")
    }

    pub fn host_resolver(&self) -> HostResolver {
        HostResolver::builder()
            .override_var(self.host_override_var.clone())
            .cache(HostCache::new(&self.state_dir))
            .ttl(self.host_cache_ttl)
            .build()
    }
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parser;

    #[test]
    fn defaults_live_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_servers.yaml");
        std::fs::write(&path, "servers: []\n").unwrap();
        let store = Parser::new().load_store(&path).unwrap();

        let ctx = SupervisorContext::from_store(&store, ContextOverrides::default());
        assert_eq!(ctx.state_dir, dir.path().join(".mcpm"));
        assert_eq!(ctx.log_dir, dir.path().join(".mcpm/logs"));
        assert_eq!(ctx.poll_interval, Duration::from_secs(30));
        assert_eq!(ctx.grace_period, Duration::from_secs(10));
        assert_eq!(ctx.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn settings_and_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_servers.yaml");
        std::fs::write(
            &path,
            "settings:\n  state_dir: run\n  grace_period: 2s\n  restart:\n    max_restarts: 1\nservers: []\n",
        )
        .unwrap();
        let store = Parser::new().load_store(&path).unwrap();

        let ctx = SupervisorContext::from_store(&store, ContextOverrides::default());
        assert_eq!(ctx.state_dir, dir.path().join("run"));
        assert_eq!(ctx.grace_period, Duration::from_secs(2));
        assert_eq!(ctx.restart.max_restarts, 1);

        let other = dir.path().join("elsewhere");
        let ctx = SupervisorContext::from_store(
            &store,
            ContextOverrides {
                state_dir: Some(other.clone()),
                poll_interval: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );
        assert_eq!(ctx.state_dir, other);
        assert_eq!(ctx.log_dir, other.join("logs"));
        assert_eq!(ctx.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn log_file_uses_sanitized_name() {
        let ctx = SupervisorContext::for_state_dir(Path::new("/state"));
        assert_eq!(ctx.log_file("fetch").unwrap(), PathBuf::from("/state/logs/fetch.log"));
        assert!(ctx.log_file("../x").is_err());
    }
}
