use super::{port_in_use, BatchReport, Supervisor};
use crate::config::ServerSpec;
use crate::error::{Error, Result};
use crate::process::{Liveness, SpawnRequest, StopOutcome};
use crate::render::render_command;
use crate::state::{new_token, ProcessRecord};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Started {
    /// A new process was spawned and recorded.
    Spawned { pid: u32, warnings: Vec<String> },
    /// A live record already existed; nothing was spawned.
    AlreadyRunning { pid: u32 },
}

impl Started {
    pub fn pid(&self) -> u32 {
        match self {
            Started::Spawned { pid, .. } | Started::AlreadyRunning { pid } => *pid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Stopped {
    /// The process was signalled and is gone. `forced` if SIGKILL was needed.
    Stopped { pid: u32, forced: bool },
    /// The record pointed at a process that had already exited.
    AlreadyStopped { pid: u32 },
    /// There was no record.
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restarted {
    pub previous: Option<Stopped>,
    /// Stop failure that did not prevent the new start
    pub stop_error: Option<String>,
    pub started: Started,
}

impl Supervisor {
    /// Start `name`. Starting a running entry is a successful no-op.
    ///
    /// An explicit start clears any crash-loop marker the daemon left.
    pub async fn start(&self, name: &str) -> Result<Started> {
        let spec = self.store().require(name)?.clone();
        if !spec.enabled {
            tracing::warn!("Server '{}' is disabled; starting it because it was named", name);
        }

        let _guard = self.locks().acquire(name).await?;
        if self.records().clear_failure(name)? {
            tracing::info!("Cleared crash-loop marker for '{}'", name);
        }
        self.start_locked(&spec).await
    }

    /// Body of `start`. Caller must hold the name lock.
    #[tracing::instrument(skip(self, spec), fields(server.name = %spec.name))]
    pub(crate) async fn start_locked(&self, spec: &ServerSpec) -> Result<Started> {
        let name = spec.name.as_str();

        if let Some(record) = self.records().read(name)? {
            match self.backend().liveness(&record) {
                Liveness::Alive => {
                    tracing::info!("'{}' is already running (PID {})", name, record.pid);
                    return Ok(Started::AlreadyRunning { pid: record.pid });
                }
                Liveness::Unknown => {
                    return Err(Error::RecordConflict {
                        name: name.to_string(),
                        pid: record.pid,
                    });
                }
                stale => {
                    tracing::debug!(
                        "Removing stale record for '{}' (PID {}, {:?})",
                        name,
                        record.pid,
                        stale
                    );
                    self.records().remove(name)?;
                }
            }
        }

        let rendered = render_command(spec)?;
        let mut warnings: Vec<String> = rendered.warnings.iter().map(|w| w.to_string()).collect();
        if let Some(port) = spec.bind_port {
            if port_in_use(port) {
                warnings.push(format!("port {} is already in use", port));
            }
        }
        for warning in &warnings {
            tracing::warn!("'{}': {}", name, warning);
        }

        let log_file = self.ctx().log_file(name)?;
        let token = new_token();
        let spawned = self
            .backend()
            .spawn(SpawnRequest {
                name,
                command: &rendered.command,
                env: &spec.env,
                working_directory: spec.working_directory.as_deref(),
                log_file: &log_file,
                token: &token,
            })
            .await?;

        let record = ProcessRecord {
            name: name.to_string(),
            pid: spawned.pid,
            started_at: Utc::now(),
            command: rendered.command,
            token: Some(token),
            start_ticks: spawned.start_ticks,
            boot_id: spawned.boot_id,
            log_file: Some(log_file),
        };
        if let Err(e) = self.records().write(&record) {
            // An unrecorded child could never be stopped; take it down again.
            tracing::error!("Failed to record '{}' (PID {}): {}", name, record.pid, e);
            if let Err(kill_err) = self.backend().terminate(&record, Duration::ZERO).await {
                tracing::warn!("Failed to kill unrecorded PID {}: {}", record.pid, kill_err);
            }
            return Err(e);
        }
        if let Err(e) = self.records().clear_pending(name) {
            tracing::warn!("Failed to clear pending restart for '{}': {}", name, e);
        }

        tracing::info!("Started '{}' (PID {})", name, record.pid);
        Ok(Started::Spawned {
            pid: record.pid,
            warnings,
        })
    }

    /// Stop `name`. A missing record reports `NotRunning`; a stale one is
    /// cleaned up and reported as `AlreadyStopped`.
    ///
    /// Names absent from the config are accepted as long as a record exists,
    /// so servers removed from the file can still be stopped.
    pub async fn stop(&self, name: &str) -> Result<Stopped> {
        if self.store().get(name).is_none() && !self.records().record_path(name)?.exists() {
            self.store().require(name)?;
        }
        let _guard = self.locks().acquire(name).await?;
        self.stop_locked(name).await
    }

    #[tracing::instrument(skip(self), fields(server.name = %name))]
    pub(crate) async fn stop_locked(&self, name: &str) -> Result<Stopped> {
        // A stop also cancels a restart the daemon has queued after a failed spawn.
        let cancelled = self.records().clear_pending(name)?;
        let Some(record) = self.records().read(name)? else {
            if cancelled {
                tracing::info!("'{}' is not running; cancelled its pending restart", name);
            } else {
                tracing::info!("'{}' is not running", name);
            }
            return Ok(Stopped::NotRunning);
        };

        if self.backend().liveness(&record).is_stale() {
            self.records().remove(name)?;
            tracing::info!("'{}' (PID {}) had already exited", name, record.pid);
            return Ok(Stopped::AlreadyStopped { pid: record.pid });
        }

        match self
            .backend()
            .terminate(&record, self.ctx().grace_period)
            .await
        {
            Ok(StopOutcome::AlreadyExited) => {
                self.records().remove(name)?;
                Ok(Stopped::AlreadyStopped { pid: record.pid })
            }
            Ok(outcome) => {
                self.records().remove(name)?;
                let forced = outcome == StopOutcome::Killed;
                if forced {
                    tracing::warn!(
                        "'{}' (PID {}) ignored SIGTERM for {:?} and was killed",
                        name,
                        record.pid,
                        self.ctx().grace_period
                    );
                } else {
                    tracing::info!("Stopped '{}' (PID {})", name, record.pid);
                }
                Ok(Stopped::Stopped {
                    pid: record.pid,
                    forced,
                })
            }
            Err(Error::InvalidPid { pid, reason }) => {
                tracing::warn!("Discarding record for '{}': invalid PID {} ({})", name, pid, reason);
                self.records().remove(name)?;
                Ok(Stopped::AlreadyStopped { pid })
            }
            Err(e) => {
                if self.backend().liveness(&record).is_stale() {
                    tracing::debug!("Signal to '{}' failed but the process is gone: {}", name, e);
                    self.records().remove(name)?;
                    Ok(Stopped::AlreadyStopped { pid: record.pid })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Stop then start under one lock. A failed stop does not prevent the
    /// start attempt, but if the old process survived, the stop error is
    /// returned instead of reporting the survivor as restarted.
    pub async fn restart(&self, name: &str) -> Result<Restarted> {
        let spec = self.store().require(name)?.clone();
        let _guard = self.locks().acquire(name).await?;

        let (previous, stop_error) = match self.stop_locked(name).await {
            Ok(stopped) => (Some(stopped), None),
            Err(e) => {
                tracing::warn!("Stopping '{}' failed, starting anyway: {}", name, e);
                (None, Some(e))
            }
        };
        self.records().clear_failure(name)?;

        match (self.start_locked(&spec).await, stop_error) {
            (Ok(Started::AlreadyRunning { .. }), Some(stop_error)) => Err(stop_error),
            (Ok(started), stop_error) => Ok(Restarted {
                previous,
                stop_error: stop_error.map(|e| e.to_string()),
                started,
            }),
            (Err(start_error), Some(stop_error)) => Err(Error::Multiple(vec![stop_error, start_error])),
            (Err(start_error), None) => Err(start_error),
        }
    }

    /// Start every enabled entry concurrently. Invalid entries are reported
    /// as failures so the batch exit status reflects them, unless they were
    /// written `enabled: false`.
    pub async fn start_all(&self) -> BatchReport<Started> {
        let names: Vec<String> = self.store().enabled().map(|s| s.name.clone()).collect();
        let results = join_all(names.iter().map(|name| self.start(name))).await;

        let mut report: BatchReport<Started> = names.into_iter().zip(results).collect();
        for entry in self.store().entry_errors().iter().filter(|e| !e.is_disabled()) {
            let label = entry
                .name
                .clone()
                .unwrap_or_else(|| format!("#{}", entry.index));
            report.push(label, Err(entry.to_error()));
        }
        report
    }

    /// Stop every configured entry plus any orphaned record whose name is no
    /// longer in the config. Every stop is attempted.
    pub async fn stop_all(&self) -> BatchReport<Stopped> {
        let mut names: Vec<String> = self.store().servers().iter().map(|s| s.name.clone()).collect();
        let known: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let orphans: Vec<String> = match self.records().list() {
            Ok(records) => records
                .into_iter()
                .map(|r| r.name)
                .filter(|n| !known.contains(n.as_str()))
                .collect(),
            Err(e) => {
                tracing::warn!("Cannot list records: {}", e);
                Vec::new()
            }
        };
        names.extend(orphans);

        let results = join_all(names.iter().map(|name| self.stop(name))).await;
        names.into_iter().zip(results).collect()
    }
}
