use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mcpm")]
#[command(about = "MCP Manager - Launch and supervise background MCP servers")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to mcp_servers.yaml, searched upwards)
    #[arg(short, long, global = true, env = "MCPM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for process records, locks and caches
    #[arg(long, global = true, env = "MCPM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start servers
    Start {
        /// Server to start (defaults to all enabled servers)
        name: Option<String>,

        /// Keep running and supervise after starting (same as MCP_DAEMON_MODE=true)
        #[arg(long)]
        daemon: bool,
    },
    /// Stop servers
    Stop {
        /// Server to stop (defaults to every server with a record)
        name: Option<String>,
    },
    /// Restart a server
    Restart {
        /// Server to restart
        name: String,
    },
    /// Show server status
    Status {
        /// Server to show (defaults to all enabled servers)
        name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start all enabled servers and restart them when they exit
    Daemon {
        /// Seconds between liveness sweeps (overrides settings.poll_interval)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Validate configuration without starting anything
    Validate,
    /// Resolve the host address advertised to clients
    Host {
        /// Ignore the cached result and probe again
        #[arg(long)]
        refresh: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the endpoints of enabled servers for client configuration
    Endpoints {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_name = "SHELL")]
        shell: clap_complete::Shell,
    },
}
