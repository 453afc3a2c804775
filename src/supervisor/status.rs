use super::{port_in_use, BatchReport, Supervisor};
use crate::config::ServerSpec;
use crate::error::Result;
use crate::process::Liveness;
use crate::state::{FailureMarker, ProcessRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerState {
    Running,
    Stopped,
    /// A process holds the recorded PID but could not be verified as ours.
    Unknown,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ServerState::Running => "RUNNING",
            ServerState::Stopped => "STOPPED",
            ServerState::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub enabled: bool,
    pub kind: String,
    pub port: Option<u16>,
    pub state: ServerState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Left behind by a record whose process has exited
    pub stale_record: bool,
    /// Set while the daemon has given up restarting this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailureMarker>,
    pub port_listening: Option<bool>,
    pub url: Option<String>,
    /// A record exists but the name is no longer configured
    pub orphan: bool,
    pub log_file: Option<PathBuf>,
}

impl Supervisor {
    /// Status of one entry. Read-only: a stale record is reported but kept,
    /// so the daemon still sees the crash on its next sweep.
    pub async fn status(&self, name: &str) -> Result<ServerStatus> {
        let spec = self.store().get(name);
        if spec.is_none() && !self.records().record_path(name)?.exists() {
            self.store().require(name)?;
        }
        let host = self.resolver().resolve(false).await;
        self.status_with_host(name, spec, &host.resolved_host)
    }

    /// Enabled entries, plus disabled entries and unknown names that still
    /// have a record.
    pub async fn status_all(&self) -> BatchReport<ServerStatus> {
        let mut report = BatchReport::default();
        let host = self.resolver().resolve(false).await;
        let records = match self.records().list() {
            Ok(records) => records,
            Err(e) => {
                report.push("*", Err(e));
                Vec::new()
            }
        };
        let has_record = |name: &str| records.iter().any(|r| r.name == name);

        for spec in self.store().servers() {
            if !spec.enabled && !has_record(&spec.name) {
                continue;
            }
            report.push(
                spec.name.clone(),
                self.status_with_host(&spec.name, Some(spec), &host.resolved_host),
            );
        }
        for record in records.iter().filter(|r| self.store().get(&r.name).is_none()) {
            report.push(
                record.name.clone(),
                self.status_with_host(&record.name, None, &host.resolved_host),
            );
        }
        report
    }

    fn status_with_host(
        &self,
        name: &str,
        spec: Option<&ServerSpec>,
        host: &str,
    ) -> Result<ServerStatus> {
        let record = self.records().read(name)?;
        let liveness = record.as_ref().map(|r| self.backend().liveness(r));
        let live = |r: &ProcessRecord| (Some(r.pid), Some(r.started_at));

        let (state, (pid, started_at), stale_record) = match (&record, liveness) {
            (Some(r), Some(Liveness::Alive)) => (ServerState::Running, live(r), false),
            (Some(r), Some(Liveness::Unknown)) => (ServerState::Unknown, live(r), false),
            (Some(_), _) => (ServerState::Stopped, (None, None), true),
            (None, _) => (ServerState::Stopped, (None, None), false),
        };

        let port = spec.and_then(|s| s.bind_port);
        Ok(ServerStatus {
            name: name.to_string(),
            enabled: spec.map_or(false, |s| s.enabled),
            kind: spec.map_or("-", |s| s.kind_label()).to_string(),
            port,
            state,
            pid,
            started_at,
            stale_record,
            failed: self.records().read_failure(name)?,
            port_listening: port.map(port_in_use),
            url: port.map(|p| format!("http://{}:{}/sse", host, p)),
            orphan: spec.is_none(),
            log_file: record
                .and_then(|r| r.log_file)
                .or_else(|| self.ctx().log_file(name).ok()),
        })
    }
}
