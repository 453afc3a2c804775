//! Host address resolution for endpoint advertisement.
//!
//! Precedence, first success wins:
//! 1. explicit override (`REAL_HOST_IP` by default, then `EXTERNAL_HOST`)
//! 2. default-gateway probe when running inside a container
//! 3. `localhost`
//!
//! Nothing here fails hard; every failed attempt is logged and the chain
//! moves on.

mod cache;
mod probe;
mod resolver;

pub use cache::HostCache;
pub use probe::{in_container, parse_ip_route, parse_proc_net_route, ContainerGatewayProbe, GatewayProbe};
pub use resolver::{HostResolver, HostResolverBuilder, EXTERNAL_HOST_VAR};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const FALLBACK_HOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostSource {
    Override,
    Gateway,
    Fallback,
}

impl fmt::Display for HostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostSource::Override => "override",
            HostSource::Gateway => "gateway",
            HostSource::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub resolved_host: String,
    pub source: HostSource,
    pub resolved_at: DateTime<Utc>,
}

impl HostInfo {
    pub fn new(resolved_host: impl Into<String>, source: HostSource) -> Self {
        Self {
            resolved_host: resolved_host.into(),
            source,
            resolved_at: Utc::now(),
        }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_HOST, HostSource::Fallback)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.resolved_at);
        age >= chrono::Duration::zero()
            && chrono::Duration::from_std(ttl).map_or(true, |ttl| age < ttl)
    }
}
