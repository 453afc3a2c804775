use crate::output::UserOutput;
use mcp_manager::{Stopped, Supervisor};

pub async fn run_stop(
    supervisor: &Supervisor,
    name: Option<String>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    if let Some(name) = name {
        let stopped = supervisor.stop(&name).await?;
        report_stopped(&name, &stopped, out);
        return Ok(());
    }

    out.status("Stopping all servers...");
    let report = supervisor.stop_all().await;
    for (name, result) in &report.results {
        match result {
            // Idle entries are noise when stopping everything.
            Ok(Stopped::NotRunning) => {}
            Ok(stopped) => report_stopped(name, stopped, out),
            Err(e) => out.error(&format!("  x {:<24} {}", name, e)),
        }
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} server(s) failed to stop",
            report.failure_count(),
            report.len()
        );
    }
    out.success("Servers stopped");
    Ok(())
}

fn report_stopped(name: &str, stopped: &Stopped, out: &dyn UserOutput) {
    match stopped {
        Stopped::Stopped { pid, forced: false } => {
            out.success(&format!("  o {:<24} stopped (PID {})", name, pid))
        }
        Stopped::Stopped { pid, forced: true } => out.success(&format!(
            "  o {:<24} killed after grace period (PID {})",
            name, pid
        )),
        Stopped::AlreadyStopped { pid } => out.status(&format!(
            "  o {:<24} already stopped (stale PID {} cleaned up)",
            name, pid
        )),
        Stopped::NotRunning => out.status(&format!("  o {:<24} not running", name)),
    }
}
