mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use mcp_manager::process::SERVER_NAME_ENV;
use mcp_manager::{
    ContextOverrides, Error as McpError, Parser as ConfigParser, Supervisor, SupervisorContext,
};
use std::time::Duration;

/// `MCP_DAEMON_MODE=true` turns a bare `mcpm start` into `mcpm daemon`.
const DAEMON_MODE_ENV: &str = "MCP_DAEMON_MODE";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(mcp_error) = e.downcast_ref::<McpError>() {
            eprintln!("Error: {}", mcp_error);
            if let Some(suggestion) = mcp_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    // A server we launched calling back into mcpm would start itself again.
    if let Ok(parent_server) = std::env::var(SERVER_NAME_ENV) {
        if matches!(cli.command, Commands::Start { .. } | Commands::Daemon { .. }) {
            eprintln!("Error: Circular invocation detected!");
            eprintln!();
            eprintln!(
                "  Server '{}' invoked 'mcpm', which would spawn it again.",
                parent_server
            );
            eprintln!();
            eprintln!("  Fix: change the start_command of '{}' to run the server", parent_server);
            eprintln!("  directly instead of going through 'mcpm'.");
            std::process::exit(1);
        }
    }

    // ── Tier 1: Commands that need NO config ──────────────────────────
    match &cli.command {
        Commands::Validate => {
            return commands::run_validate(cli.config.clone(), &output::CliOutput);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    // ── Load config ─────────────────────────────────────────────────
    let parser = ConfigParser::new();
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => parser.find_config_file()?,
    };
    let store = parser.load_store(&config_path)?;
    for warning in store.warnings() {
        tracing::warn!("{}", warning);
    }
    for entry in store.entry_errors() {
        tracing::warn!("{}", entry.to_error());
    }

    let interval = match &cli.command {
        Commands::Daemon { interval } => interval.map(Duration::from_secs),
        _ => None,
    };
    if interval == Some(Duration::ZERO) {
        anyhow::bail!("--interval must be at least 1 second");
    }
    let ctx = SupervisorContext::from_store(
        &store,
        ContextOverrides {
            state_dir: cli.state_dir.clone(),
            poll_interval: interval,
            ..Default::default()
        },
    );

    // ── Tier 2: Commands that need config but NOT the supervisor ─────
    if let Commands::Host { refresh, json } = &cli.command {
        return commands::run_host(&ctx.host_resolver(), *refresh, *json, &output::CliOutput).await;
    }

    // ── Tier 3: Commands that need the supervisor ───────────────────
    let supervisor = Supervisor::new(ctx, store);

    match cli.command {
        Commands::Start { name, daemon } => {
            let daemon_mode = daemon || env_flag(DAEMON_MODE_ENV);
            if daemon_mode && name.is_none() {
                commands::run_daemon(supervisor, &output::CliOutput).await?;
            } else {
                if daemon_mode {
                    tracing::warn!("Daemon mode ignored when starting a single server");
                }
                commands::run_start(&supervisor, name, &output::CliOutput).await?;
            }
        }
        Commands::Stop { name } => {
            commands::run_stop(&supervisor, name, &output::CliOutput).await?;
        }
        Commands::Restart { name } => {
            commands::run_restart(&supervisor, &name, &output::CliOutput).await?;
        }
        Commands::Status { name, json } => {
            commands::run_status(&supervisor, name, json, &output::CliOutput).await?;
        }
        Commands::Daemon { .. } => {
            commands::run_daemon(supervisor, &output::CliOutput).await?;
        }
        Commands::Endpoints { json } => {
            commands::run_endpoints(&supervisor, json, &output::CliOutput).await?;
        }
        // Handled in earlier tiers
        Commands::Validate | Commands::Completions { .. } | Commands::Host { .. } => {
            unreachable!("handled in earlier dispatch tiers");
        }
    }

    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
