use crate::output::UserOutput;
use mcp_manager::{Started, Stopped, Supervisor};

pub async fn run_restart(
    supervisor: &Supervisor,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    out.progress(&format!("Restarting {}...", name));
    let restarted = match supervisor.restart(name).await {
        Ok(restarted) => restarted,
        Err(e) => {
            out.finish_progress(" failed");
            return Err(e.into());
        }
    };
    out.finish_progress(" done");

    match restarted.previous {
        Some(Stopped::Stopped { pid, forced }) => out.status(&format!(
            "  stopped PID {}{}",
            pid,
            if forced { " (killed)" } else { "" }
        )),
        Some(Stopped::AlreadyStopped { pid }) => {
            out.status(&format!("  previous PID {} had already exited", pid))
        }
        Some(Stopped::NotRunning) | None => {}
    }
    if let Some(error) = &restarted.stop_error {
        out.warning(&format!("stop phase failed: {}", error));
    }

    match restarted.started {
        Started::Spawned { pid, warnings } => {
            out.success(&format!("  started PID {}", pid));
            for warning in warnings {
                out.warning(&format!("{}: {}", name, warning));
            }
        }
        Started::AlreadyRunning { pid } => out.status(&format!("  already running (PID {})", pid)),
    }
    Ok(())
}
