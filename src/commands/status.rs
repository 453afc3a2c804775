use crate::output::UserOutput;
use mcp_manager::{ServerState, ServerStatus, Supervisor};

pub async fn run_status(
    supervisor: &Supervisor,
    name: Option<String>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let (statuses, errors) = match name {
        Some(name) => (vec![supervisor.status(&name).await?], Vec::new()),
        None => {
            let mut ok = Vec::new();
            let mut errors = Vec::new();
            for (name, result) in supervisor.status_all().await.results {
                match result {
                    Ok(status) => ok.push(status),
                    Err(e) => errors.push((name, e)),
                }
            }
            (ok, errors)
        }
    };

    if json {
        out.status(&serde_json::to_string_pretty(&statuses)?);
    } else {
        print_table(&statuses, out);
    }

    if !errors.is_empty() {
        for (name, e) in &errors {
            out.error(&format!("  x {:<24} {}", name, e));
        }
        anyhow::bail!("status failed for {} server(s)", errors.len());
    }
    Ok(())
}

fn print_table(statuses: &[ServerStatus], out: &dyn UserOutput) {
    if statuses.is_empty() {
        out.status("No enabled servers configured");
        return;
    }

    out.status(&format!(
        "  {:<24} {:<12} {:<8} {:<8} {:<8} {}",
        "NAME", "TYPE", "PORT", "STATE", "PID", "URL"
    ));
    out.status(&format!("  {:-<90}", ""));
    for status in statuses {
        let icon = match status.state {
            ServerState::Running => "+",
            ServerState::Stopped if status.failed.is_some() => "x",
            ServerState::Stopped => "o",
            ServerState::Unknown => "?",
        };
        let mut notes = Vec::new();
        if !status.enabled && !status.orphan {
            notes.push("disabled".to_string());
        }
        if status.orphan {
            notes.push("not in config".to_string());
        }
        if status.stale_record {
            notes.push("exited".to_string());
        }
        if let Some(marker) = &status.failed {
            notes.push(format!("failed after {} crashes", marker.failures));
        }
        if status.state == ServerState::Stopped && status.port_listening == Some(true) {
            notes.push("port in use".to_string());
        }

        out.status(&format!(
            "{} {:<24} {:<12} {:<8} {:<8} {:<8} {}{}",
            icon,
            status.name,
            status.kind,
            status.port.map_or("-".to_string(), |p| p.to_string()),
            status.state,
            status.pid.map_or("-".to_string(), |p| p.to_string()),
            status.url.as_deref().unwrap_or("-"),
            if notes.is_empty() {
                String::new()
            } else {
                format!("  ({})", notes.join(", "))
            }
        ));
    }
}
