//! Configuration parsing and types.
//!
//! - `server` - Server entries (`RawServer`, `ServerSpec`, `ServerKind`)
//! - `settings` - Supervisor-wide settings and restart policy
//! - `store` - The loaded entry set (`ServerStore`)
//! - `parser` - Config discovery and YAML/JSON parsing
//! - `validation` - Cross-entry checks and load-time warnings

mod duration;
mod parser;
mod server;
mod settings;
mod store;
mod validation;

pub use duration::*;
pub use parser::*;
pub use server::*;
pub use settings::*;
pub use store::*;
pub use validation::*;
