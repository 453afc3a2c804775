use crate::output::UserOutput;
use mcp_manager::config::format_duration;
use mcp_manager::{render_command, Parser as ConfigParser};
use std::path::PathBuf;

pub fn run_validate(config_path: Option<PathBuf>, out: &dyn UserOutput) -> anyhow::Result<()> {
    let parser = ConfigParser::new();
    let config_path = match config_path {
        Some(path) => path,
        None => match parser.find_config_file() {
            Ok(path) => path,
            Err(e) => {
                out.error("Error: No configuration file found");
                out.status("\nSearched for mcp_servers.yaml (or .yml/.json) in:");
                out.status(&format!(
                    "  - Current directory: {}",
                    std::env::current_dir()?.display()
                ));
                out.status("  - Its config/ subdirectory");
                out.status("  - Parent directories up to root");
                return Err(e.into());
            }
        },
    };

    out.status(&format!("Validating {}...", config_path.display()));
    let store = parser.load_store(&config_path)?;

    out.status(&format!("\nServers: {}", store.servers().len()));
    for spec in store.servers() {
        let command = render_command(spec)
            .map(|r| r.command)
            .unwrap_or_else(|e| format!("<{}>", e));
        out.status(&format!(
            "  - {} ({}{}{})",
            spec.name,
            spec.kind_label(),
            spec.bind_port.map(|p| format!(", port {}", p)).unwrap_or_default(),
            if spec.enabled { "" } else { ", disabled" }
        ));
        out.status(&format!("      $ {}", command));
    }

    let settings = store.settings();
    out.status(&format!(
        "\nDaemon: sweep every {}, grace period {}, up to {} restarts per {}",
        format_duration(settings.get_poll_interval()),
        format_duration(settings.get_grace_period()),
        settings.restart.max_restarts,
        format_duration(settings.restart.get_window())
    ));

    if !store.warnings().is_empty() {
        out.blank();
        for warning in store.warnings() {
            out.warning(warning);
        }
    }

    if !store.entry_errors().is_empty() {
        out.blank();
        out.error(&format!("Invalid entries: {}", store.entry_errors().len()));
        for entry in store.entry_errors() {
            out.error(&format!("  - {}", entry.to_error()));
        }
        anyhow::bail!(
            "{} invalid server entr{}",
            store.entry_errors().len(),
            if store.entry_errors().len() == 1 { "y" } else { "ies" }
        );
    }

    out.blank();
    out.success("Configuration is valid");
    Ok(())
}
