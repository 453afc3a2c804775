use crate::output::UserOutput;
use mcp_manager::{Started, Supervisor};

pub async fn run_start(
    supervisor: &Supervisor,
    name: Option<String>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    if let Some(name) = name {
        let started = supervisor.start(&name).await?;
        report_started(&name, &started, out);
        return Ok(());
    }

    let store = supervisor.store();
    if store.enabled().next().is_none() && store.entry_errors().is_empty() {
        out.status("No enabled servers configured");
        return Ok(());
    }

    out.status("Starting all enabled servers...");
    let report = supervisor.start_all().await;
    for (name, result) in &report.results {
        match result {
            Ok(started) => report_started(name, started, out),
            Err(e) => out.error(&format!("  x {:<24} {}", name, e)),
        }
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} server(s) failed to start",
            report.failure_count(),
            report.len()
        );
    }
    out.blank();
    out.success("All enabled servers are running");
    Ok(())
}

fn report_started(name: &str, started: &Started, out: &dyn UserOutput) {
    match started {
        Started::Spawned { pid, warnings } => {
            out.success(&format!("  + {:<24} started (PID {})", name, pid));
            for warning in warnings {
                out.warning(&format!("{}: {}", name, warning));
            }
        }
        Started::AlreadyRunning { pid } => {
            out.status(&format!("  = {:<24} already running (PID {})", name, pid));
        }
    }
}
