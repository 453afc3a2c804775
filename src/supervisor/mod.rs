//! The process supervisor: start, stop, restart and status per entry, batch
//! variants over the whole store, and the continuous daemon loop.
//!
//! Per-entry state machine:
//!
//! ```text
//! STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED
//!                        RUNNING -> RUNNING              (start is a no-op)
//!                        RUNNING -> CRASHED -> STARTING  (daemon restart)
//! ```
//!
//! Every operation on a name runs under [`NameLocks`], so a `start` and a
//! `stop` racing on one entry cannot both act. Operations on different names
//! proceed concurrently.

mod batch;
mod context;
mod daemon;
mod lifecycle;
mod locks;
mod ports;
mod restart;
mod status;

pub use batch::BatchReport;
pub use context::{
    ContextOverrides, RestartPolicy, SupervisorContext, DEFAULT_PROBE_TIMEOUT, DEFAULT_STATE_DIR,
};
pub use daemon::{Daemon, DaemonSnapshot, EntrySnapshot, SweepAction, SweepReport};
pub use lifecycle::{Restarted, Started, Stopped};
pub use locks::{NameGuard, NameLocks};
pub use ports::port_in_use;
pub use restart::{calculate_backoff_delay, should_restart, CrashDecision, RestartTracker};
pub use status::{ServerState, ServerStatus};

use crate::config::ServerStore;
use crate::host::HostResolver;
use crate::process::{default_backend, ProcessBackend};
use crate::state::RecordStore;
use std::sync::Arc;

/// Owns everything the operations need. Cheap to clone; clones share the
/// in-process name locks and the host resolver memo.
#[derive(Clone)]
pub struct Supervisor {
    ctx: Arc<SupervisorContext>,
    store: Arc<ServerStore>,
    records: RecordStore,
    backend: Arc<dyn ProcessBackend>,
    locks: NameLocks,
    resolver: Arc<HostResolver>,
}

impl Supervisor {
    /// Supervisor using the platform process backend.
    pub fn new(ctx: SupervisorContext, store: ServerStore) -> Self {
        Self::with_backend(ctx, store, default_backend())
    }

    pub fn with_backend(
        ctx: SupervisorContext,
        store: ServerStore,
        backend: Arc<dyn ProcessBackend>,
    ) -> Self {
        let records = ctx.records();
        let locks = NameLocks::new(&ctx.lock_dir());
        let resolver = Arc::new(ctx.host_resolver());
        Self {
            ctx: Arc::new(ctx),
            store: Arc::new(store),
            records,
            backend,
            locks,
            resolver,
        }
    }

    /// Replace the host resolver (tests pin the environment and probe).
    pub fn with_resolver(mut self, resolver: HostResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn ctx(&self) -> &SupervisorContext {
        &self.ctx
    }

    pub fn store(&self) -> &ServerStore {
        &self.store
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn backend(&self) -> &Arc<dyn ProcessBackend> {
        &self.backend
    }

    pub fn resolver(&self) -> &HostResolver {
        &self.resolver
    }

    pub(crate) fn locks(&self) -> &NameLocks {
        &self.locks
    }
}
