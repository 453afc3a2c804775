//! Supervisor-wide settings from the `settings:` block.
//!
//! Durations are kept as strings the way they appear in the file and parsed
//! on access, falling back to defaults. `validate()` reports unparsable values
//! up front so the fallbacks never hide a typo.

use super::parse_duration_string;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);
pub const DEFAULT_HOST_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_HOST_OVERRIDE_VAR: &str = "REAL_HOST_IP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Daemon sweep interval (default: 30s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,

    /// Time between SIGTERM and SIGKILL (default: 10s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<String>,

    /// Directory for records, locks and caches, relative to the config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,

    /// Directory for server logs (default: `<state_dir>/logs`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Environment variable holding an explicit host address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_override_var: Option<String>,

    /// How long a resolved host stays fresh in `host_info.json` (default: 5m)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_cache_ttl: Option<String>,

    #[serde(default)]
    pub restart: RestartSettings,
}

/// Crash-restart policy applied by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartSettings {
    /// Restarts allowed inside `window` before the entry is marked failed
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,

    /// Base delay for exponential backoff between restarts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_backoff: Option<String>,
}

fn default_max_restarts() -> u32 {
    5
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            window: None,
            backoff: None,
            max_backoff: None,
        }
    }
}

impl RestartSettings {
    pub fn get_window(&self) -> Duration {
        parse_or(&self.window, Duration::from_secs(300))
    }

    pub fn get_backoff(&self) -> Duration {
        parse_or(&self.backoff, Duration::from_secs(1))
    }

    pub fn get_max_backoff(&self) -> Duration {
        parse_or(&self.max_backoff, Duration::from_secs(60))
    }
}

impl Settings {
    pub fn get_poll_interval(&self) -> Duration {
        parse_or(&self.poll_interval, DEFAULT_POLL_INTERVAL)
    }

    pub fn get_grace_period(&self) -> Duration {
        parse_or(&self.grace_period, DEFAULT_GRACE_PERIOD)
    }

    pub fn get_host_cache_ttl(&self) -> Duration {
        parse_or(&self.host_cache_ttl, DEFAULT_HOST_CACHE_TTL)
    }

    pub fn get_host_override_var(&self) -> &str {
        self.host_override_var
            .as_deref()
            .unwrap_or(DEFAULT_HOST_OVERRIDE_VAR)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("poll_interval", &self.poll_interval),
            ("grace_period", &self.grace_period),
            ("host_cache_ttl", &self.host_cache_ttl),
            ("restart.window", &self.restart.window),
            ("restart.backoff", &self.restart.backoff),
            ("restart.max_backoff", &self.restart.max_backoff),
        ];
        for (field, value) in durations {
            if let Some(v) = value {
                if parse_duration_string(v).is_none() {
                    return Err(Error::Validation(format!(
                        "settings.{} has invalid duration '{}'. Use formats like '500ms', '10s', '5m', '1h'",
                        field, v
                    )));
                }
            }
        }
        if self.get_poll_interval().is_zero() {
            return Err(Error::Validation(
                "settings.poll_interval must be greater than zero".to_string(),
            ));
        }
        if let Some(var) = &self.host_override_var {
            if var.trim().is_empty() {
                return Err(Error::Validation(
                    "settings.host_override_var must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_or(value: &Option<String>, default: Duration) -> Duration {
    value
        .as_deref()
        .and_then(parse_duration_string)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_block_is_missing() {
        let s = Settings::default();
        assert_eq!(s.get_poll_interval(), Duration::from_secs(30));
        assert_eq!(s.get_grace_period(), Duration::from_secs(10));
        assert_eq!(s.restart.max_restarts, 5);
        assert_eq!(s.restart.get_window(), Duration::from_secs(300));
        assert_eq!(s.get_host_override_var(), "REAL_HOST_IP");
    }

    #[test]
    fn parses_yaml_block() {
        let yaml = r#"
poll_interval: 5s
grace_period: 500ms
restart:
  max_restarts: 3
  backoff: 0s
"#;
        let s: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.get_poll_interval(), Duration::from_secs(5));
        assert_eq!(s.get_grace_period(), Duration::from_millis(500));
        assert_eq!(s.restart.max_restarts, 3);
        assert_eq!(s.restart.get_backoff(), Duration::ZERO);
        s.validate().unwrap();
    }

    #[test]
    fn rejects_bad_duration() {
        let s = Settings {
            grace_period: Some("ten seconds".into()),
            ..Default::default()
        };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("grace_period"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let s = Settings {
            poll_interval: Some("0s".into()),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
