mod daemon;
mod endpoints;
mod host;
mod restart;
mod start;
mod status;
mod stop;
mod validate;

pub use daemon::run_daemon;
pub use endpoints::run_endpoints;
pub use host::run_host;
pub use restart::run_restart;
pub use start::run_start;
pub use status::run_status;
pub use stop::run_stop;
pub use validate::run_validate;
