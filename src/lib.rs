#![allow(unused_assignments)]

//! # MCP Manager
//!
//! Launches a statically configured set of background servers, keeps track of
//! their processes across invocations, and exposes them as network endpoints.
//!
//! ## Features
//!
//! - **Declarative entries**: one YAML file lists every server with its launch
//!   template, port, environment and working directory
//! - **Closed template vocabulary**: `{start_command}`, `{sse_host}`,
//!   `{sse_port}`, `{allow_origin}` and `{name}`, shell-escaped on expansion
//! - **Durable records**: one JSON record per running server, fingerprinted so
//!   a recycled PID is never mistaken for the original process
//! - **Daemon mode**: periodic liveness sweeps with crash restarts, backoff and
//!   a crash-loop cutoff
//! - **Host resolution**: explicit override, container gateway probe, or
//!   `localhost`, cached on disk
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcp_manager::{ContextOverrides, Parser, Supervisor, SupervisorContext};
//!
//! # async fn example() -> Result<(), mcp_manager::Error> {
//! let store = Parser::new().load_store("mcp_servers.yaml")?;
//! let ctx = SupervisorContext::from_store(&store, ContextOverrides::default());
//! let supervisor = Supervisor::new(ctx, store);
//!
//! supervisor.start("fetch").await?;
//! let status = supervisor.status("fetch").await?;
//! println!("{} is {}", status.name, status.state);
//! supervisor.stop("fetch").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Operations take `&self`; a `Supervisor` is cheap to clone
//! - Operations on one name are serialized in-process and across processes
//! - Spawned servers outlive the supervisor and are only stopped explicitly

pub mod config;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod process;
pub mod render;
pub mod state;
pub mod supervisor;

// Re-export commonly used types
pub use config::{Parser, ServerSpec, ServerStore, Settings};
pub use endpoint::{endpoints, EndpointDescriptor, EndpointEmitter, JsonEmitter};
pub use error::{Error, Result};
pub use host::{HostInfo, HostResolver, HostSource};
pub use render::{render_command, RenderedCommand};
pub use state::{ProcessRecord, RecordStore};
pub use supervisor::{
    BatchReport, ContextOverrides, Daemon, ServerState, ServerStatus, Started, Stopped,
    Supervisor, SupervisorContext,
};
