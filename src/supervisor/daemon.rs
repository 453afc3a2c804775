//! Continuous supervision: bootstrap every enabled entry, then sweep on a
//! fixed interval and restart entries whose process has died.
//!
//! A record on disk means "this entry should be running". A crashed entry
//! keeps its record while its restart is backing off, and a failed spawn
//! leaves a pending-restart marker instead. An explicit `mcpm stop` removes
//! both, so the daemon only ever restarts entries whose intent is still on
//! disk. Each sweep probes all entries
//! concurrently and isolates failures, timeouts and panics per entry.

use super::{CrashDecision, RestartTracker, Started, Supervisor};
use crate::error::{Error, Result};
use crate::process::Liveness;
use crate::config::ServerSpec;
use crate::state::{atomic_write, FailureMarker, PendingRestart, ProcessRecord};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What one sweep did for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepAction {
    Alive,
    /// No record and nothing pending; the entry was stopped on purpose
    Stopped,
    /// A crash-loop marker is present; left alone until a manual start
    Failed,
    /// Record exists but the PID could not be verified
    Unverifiable,
    /// Another `mcpm` process holds the entry's lock
    Busy,
    Restarted { pid: u32, failures: u32 },
    RestartScheduled { failures: u32, delay: Duration },
    Waiting { remaining: Duration },
    GaveUp { failures: u32 },
    Error(String),
}

impl fmt::Display for SweepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAction::Alive => write!(f, "alive"),
            SweepAction::Stopped => write!(f, "stopped"),
            SweepAction::Failed => write!(f, "failed"),
            SweepAction::Unverifiable => write!(f, "unverifiable"),
            SweepAction::Busy => write!(f, "busy"),
            SweepAction::Restarted { pid, failures } => {
                write!(f, "restarted (PID {}, failure {})", pid, failures)
            }
            SweepAction::RestartScheduled { failures, delay } => {
                write!(f, "restart in {:?} (failure {})", delay, failures)
            }
            SweepAction::Waiting { remaining } => write!(f, "waiting {:?}", remaining),
            SweepAction::GaveUp { failures } => write!(f, "gave up after {} failures", failures),
            SweepAction::Error(e) => write!(f, "error: {}", e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub sweep: u64,
    pub actions: BTreeMap<String, SweepAction>,
}

impl SweepReport {
    pub fn action(&self, name: &str) -> Option<&SweepAction> {
        self.actions.get(name)
    }

    pub fn restarted(&self) -> usize {
        self.actions
            .values()
            .filter(|a| matches!(a, SweepAction::Restarted { .. }))
            .count()
    }
}

/// Contents of `daemon.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSnapshot {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sweeps: u64,
    pub running: bool,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub name: String,
    pub last_action: String,
    pub failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

enum Observation {
    Failed,
    Alive { age: Duration },
    Unknown,
    Crashed(ProcessRecord),
    /// No record, but a failed spawn is waiting to be retried
    Pending,
    Missing,
    Error(String),
}

pub struct Daemon {
    supervisor: Supervisor,
    tracker: RestartTracker,
    sweeps: u64,
    started_at: DateTime<Utc>,
    last_actions: BTreeMap<String, SweepAction>,
    lock: Option<File>,
}

impl Daemon {
    pub fn new(supervisor: Supervisor) -> Self {
        let tracker = RestartTracker::new(supervisor.ctx().restart.clone());
        Self {
            supervisor,
            tracker,
            sweeps: 0,
            started_at: Utc::now(),
            last_actions: BTreeMap::new(),
            lock: None,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn tracker(&self) -> &RestartTracker {
        &self.tracker
    }

    /// Claim `daemon.lock` so only one daemon supervises a state directory.
    pub fn acquire(&mut self) -> Result<()> {
        if self.lock.is_some() {
            return Ok(());
        }
        let path = self.supervisor.ctx().daemon_lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Filesystem(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Filesystem(format!("Cannot open '{}': {}", path.display(), e)))?;

        if file.try_lock_exclusive().is_err() {
            let mut content = String::new();
            let _ = file.read_to_string(&mut content);
            return Err(Error::DaemonAlreadyRunning {
                pid: content.trim().parse().ok(),
            });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;
        self.lock = Some(file);
        Ok(())
    }

    /// Start every enabled entry that is not marked failed. Entries that
    /// fail to spawn are scheduled for retry like a crash.
    pub async fn bootstrap(&mut self) {
        let names: Vec<String> = self
            .supervisor
            .store()
            .enabled()
            .map(|s| s.name.clone())
            .collect();

        let mut to_start = Vec::new();
        for name in names {
            match self.supervisor.records().read_failure(&name) {
                Ok(Some(marker)) => {
                    tracing::warn!(
                        "'{}' was marked failed at {} after {} crashes; not starting it",
                        name,
                        marker.marked_at,
                        marker.failures
                    );
                    self.last_actions.insert(name, SweepAction::Failed);
                }
                _ => to_start.push(name),
            }
        }

        let supervisor = &self.supervisor;
        let results = join_all(to_start.iter().map(|name| async move {
            let _guard = supervisor.locks().acquire(name).await?;
            let spec = supervisor.store().require(name)?.clone();
            start_or_mark_pending(supervisor, &spec).await
        }))
        .await;

        let now = Instant::now();
        for (name, result) in to_start.into_iter().zip(results) {
            let action = match result {
                Ok(Started::Spawned { pid, .. }) => SweepAction::Restarted { pid, failures: 0 },
                Ok(Started::AlreadyRunning { .. }) => SweepAction::Alive,
                Err(e) if e.is_configuration() => {
                    tracing::error!("Not supervising '{}': {}", name, e);
                    SweepAction::Error(e.to_string())
                }
                Err(e) => {
                    tracing::error!("Failed to start '{}': {}", name, e);
                    self.on_spawn_failure(&name, now, e.to_string())
                }
            };
            self.last_actions.insert(name, action);
        }
    }

    /// One pass over every enabled entry.
    pub async fn sweep(&mut self) -> SweepReport {
        self.sweeps += 1;
        let names: Vec<String> = self
            .supervisor
            .store()
            .enabled()
            .map(|s| s.name.clone())
            .collect();

        let observations = join_all(names.iter().map(|name| self.observe(name.clone()))).await;
        let now = Instant::now();
        let mut actions = BTreeMap::new();
        let mut restarts = Vec::new();

        for (name, observation) in names.into_iter().zip(observations) {
            let action = match observation {
                Observation::Failed => SweepAction::Failed,
                Observation::Alive { age } => {
                    if age > self.tracker.window() && self.tracker.failures(&name) > 0 {
                        tracing::info!("'{}' has been stable for {:?}; resetting crash count", name, age);
                        self.tracker.reset(&name);
                    }
                    self.tracker.clear_retry(&name);
                    SweepAction::Alive
                }
                Observation::Unknown => SweepAction::Unverifiable,
                Observation::Error(e) => {
                    tracing::warn!("Sweep check for '{}' failed: {}", name, e);
                    SweepAction::Error(e)
                }
                Observation::Pending | Observation::Crashed(_)
                    if self.tracker.retry_at(&name).is_some() =>
                {
                    match self.tracker.retry_at(&name) {
                        Some(at) if at > now => SweepAction::Waiting {
                            remaining: at - now,
                        },
                        _ => {
                            let failures = self.tracker.failures(&name);
                            restarts.push((name, failures));
                            continue;
                        }
                    }
                }
                Observation::Pending => {
                    // Left behind by an earlier daemon; retry right away.
                    let failures = self.tracker.failures(&name);
                    restarts.push((name, failures));
                    continue;
                }
                Observation::Missing => {
                    if self.tracker.retry_at(&name).is_some() {
                        tracing::info!("'{}' was stopped; dropping its scheduled restart", name);
                        self.tracker.clear_retry(&name);
                    }
                    SweepAction::Stopped
                }
                Observation::Crashed(record) => {
                    tracing::warn!("'{}' (PID {}) is no longer running", name, record.pid);
                    let error = format!("PID {} exited", record.pid);
                    match self.tracker.on_crash(&name, now, Some(error)) {
                        CrashDecision::GiveUp { failures } => self.give_up(&name, failures, Some(&record)),
                        CrashDecision::RestartNow { failures } => {
                            restarts.push((name, failures));
                            continue;
                        }
                        CrashDecision::RestartAt { failures, at } => {
                            // The dead record stays until the retry, so a stop can still cancel it.
                            tracing::info!(
                                "Restarting '{}' in {:?} (failure {})",
                                name,
                                at - now,
                                failures
                            );
                            SweepAction::RestartScheduled {
                                failures,
                                delay: at - now,
                            }
                        }
                    }
                }
            };
            actions.insert(name, action);
        }

        let results = join_all(restarts.iter().map(|(name, _)| {
            let supervisor = self.supervisor.clone();
            let name = name.clone();
            async move {
                AssertUnwindSafe(restart_entry(&supervisor, &name))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(Error::Daemon(panic_message(panic))))
            }
        }))
        .await;

        for ((name, failures), result) in restarts.into_iter().zip(results) {
            let action = match result {
                Ok(Some(pid)) => {
                    self.tracker.clear_retry(&name);
                    tracing::info!("Restarted '{}' (PID {})", name, pid);
                    SweepAction::Restarted { pid, failures }
                }
                Ok(None) => SweepAction::Busy,
                Err(e) => {
                    tracing::error!("Restart of '{}' failed: {}", name, e);
                    self.on_spawn_failure(&name, now, e.to_string())
                }
            };
            actions.insert(name, action);
        }

        for (name, action) in &actions {
            self.last_actions.insert(name.clone(), action.clone());
        }
        SweepReport {
            sweep: self.sweeps,
            actions,
        }
    }

    /// Bootstrap, then sweep every poll interval until `cancel` fires. The
    /// in-flight sweep always completes; children are left running.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        self.acquire()?;
        let interval = self.supervisor.ctx().poll_interval;
        tracing::info!(
            "Daemon started (PID {}), sweeping every {:?}",
            std::process::id(),
            interval
        );

        self.bootstrap().await;
        self.write_snapshot(true);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match AssertUnwindSafe(self.sweep()).catch_unwind().await {
                Ok(report) => {
                    if report.restarted() > 0 {
                        tracing::info!("Sweep {} restarted {} server(s)", report.sweep, report.restarted());
                    } else {
                        tracing::debug!("Sweep {} complete", report.sweep);
                    }
                }
                Err(panic) => {
                    tracing::error!("Sweep panicked: {}. Continuing.", panic_message(panic));
                }
            }
            self.write_snapshot(true);
        }

        self.write_snapshot(false);
        let running = self.supervisor.records().list().map(|r| r.len()).unwrap_or(0);
        tracing::info!("Daemon stopped; {} server(s) left running", running);
        Ok(())
    }

    pub fn snapshot(&self, running: bool) -> DaemonSnapshot {
        let now = Instant::now();
        DaemonSnapshot {
            pid: std::process::id(),
            started_at: self.started_at,
            updated_at: Utc::now(),
            sweeps: self.sweeps,
            running,
            entries: self
                .last_actions
                .iter()
                .map(|(name, action)| EntrySnapshot {
                    name: name.clone(),
                    last_action: action.to_string(),
                    failures: self.tracker.failures(name),
                    retry_in_ms: self
                        .tracker
                        .retry_at(name)
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                })
                .collect(),
        }
    }

    fn write_snapshot(&self, running: bool) {
        let path = self.supervisor.ctx().daemon_snapshot_path();
        let result = serde_json::to_string_pretty(&self.snapshot(running))
            .map_err(Error::from)
            .and_then(|json| atomic_write(&path, &json));
        if let Err(e) = result {
            tracing::warn!("Failed to write {}: {}", path.display(), e);
        }
    }

    async fn observe(&self, name: String) -> Observation {
        let records = self.supervisor.records().clone();
        let backend = self.supervisor.backend().clone();
        let limit = self.supervisor.ctx().probe_timeout;

        let task = tokio::task::spawn_blocking(move || -> Result<Observation> {
            if records.read_failure(&name)?.is_some() {
                return Ok(Observation::Failed);
            }
            let Some(record) = records.read(&name)? else {
                return Ok(if records.read_pending(&name)?.is_some() {
                    Observation::Pending
                } else {
                    Observation::Missing
                });
            };
            Ok(match backend.liveness(&record) {
                Liveness::Alive => Observation::Alive {
                    age: record.age().to_std().unwrap_or_default(),
                },
                Liveness::Unknown => Observation::Unknown,
                Liveness::Dead | Liveness::Reused => Observation::Crashed(record),
            })
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(Ok(observation))) => observation,
            Ok(Ok(Err(e))) => Observation::Error(e.to_string()),
            Ok(Err(join)) if join.is_panic() => {
                Observation::Error(format!("liveness check panicked: {}", panic_message(join.into_panic())))
            }
            Ok(Err(join)) => Observation::Error(format!("liveness check aborted: {}", join)),
            Err(_) => Observation::Error(format!("liveness check timed out after {:?}", limit)),
        }
    }

    fn on_spawn_failure(&mut self, name: &str, now: Instant, error: String) -> SweepAction {
        match self.tracker.on_crash(name, now, Some(error)) {
            CrashDecision::GiveUp { failures } => self.give_up(name, failures, None),
            CrashDecision::RestartNow { failures } => {
                // Retry on the next sweep rather than spinning here.
                self.tracker.schedule_retry(name, now);
                SweepAction::RestartScheduled {
                    failures,
                    delay: Duration::ZERO,
                }
            }
            CrashDecision::RestartAt { failures, at } => SweepAction::RestartScheduled {
                failures,
                delay: at.saturating_duration_since(now),
            },
        }
    }

    fn give_up(&mut self, name: &str, failures: u32, record: Option<&ProcessRecord>) -> SweepAction {
        let guard = match self.supervisor.locks().try_acquire(name) {
            Ok(Some(guard)) => guard,
            Ok(None) => return SweepAction::Busy,
            Err(e) => return SweepAction::Error(e.to_string()),
        };

        if let Some(record) = record {
            self.remove_if_unchanged(record);
        }
        if let Err(e) = self.supervisor.records().clear_pending(name) {
            tracing::warn!("Failed to clear pending restart for '{}': {}", name, e);
        }
        let marker = FailureMarker {
            name: name.to_string(),
            failures,
            marked_at: Utc::now(),
            last_error: self.tracker.last_error(name).map(str::to_string),
        };
        let written = self.supervisor.records().mark_failed(&marker);
        drop(guard);

        match written {
            Ok(()) => {
                tracing::error!(
                    "'{}' crashed {} times within {:?}; giving up until it is started manually",
                    name,
                    failures,
                    self.tracker.window()
                );
                self.tracker.reset(name);
                SweepAction::GaveUp { failures }
            }
            Err(e) => SweepAction::Error(format!("cannot write failure marker: {}", e)),
        }
    }

    fn remove_if_unchanged(&self, record: &ProcessRecord) {
        let records = self.supervisor.records();
        match records.read(&record.name) {
            Ok(Some(current)) if current == *record => {
                if let Err(e) = records.remove(&record.name) {
                    tracing::warn!("Failed to remove record for '{}': {}", record.name, e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Cannot read record for '{}': {}", record.name, e),
        }
    }
}

/// Restart one entry without waiting on a lock held elsewhere.
/// `Ok(None)` means the entry was busy.
async fn restart_entry(supervisor: &Supervisor, name: &str) -> Result<Option<u32>> {
    let Some(_guard) = supervisor.locks().try_acquire(name)? else {
        tracing::debug!("'{}' is locked by another process; skipping this sweep", name);
        return Ok(None);
    };
    let spec = supervisor.store().require(name)?.clone();
    Ok(Some(start_or_mark_pending(supervisor, &spec).await?.pid()))
}

/// Start `spec` with its name lock held. A failed spawn leaves a
/// pending-restart marker, since no record exists to carry the intent.
async fn start_or_mark_pending(supervisor: &Supervisor, spec: &ServerSpec) -> Result<Started> {
    let result = supervisor.start_locked(spec).await;
    if let Err(e) = &result {
        if !e.is_configuration() {
            let pending = PendingRestart {
                name: spec.name.clone(),
                scheduled_at: Utc::now(),
                last_error: Some(e.to_string()),
            };
            if let Err(write_err) = supervisor.records().mark_pending(&pending) {
                tracing::warn!("Failed to record pending restart for '{}': {}", spec.name, write_err);
            }
        }
    }
    result
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
