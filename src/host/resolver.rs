use super::{ContainerGatewayProbe, GatewayProbe, HostCache, HostInfo, HostSource};
use crate::config::{DEFAULT_HOST_CACHE_TTL, DEFAULT_HOST_OVERRIDE_VAR};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Secondary override: an IP or a hostname resolved through DNS.
pub const EXTERNAL_HOST_VAR: &str = "EXTERNAL_HOST";

const DNS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
enum EnvSource {
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            EnvSource::Process => std::env::var(key).ok(),
            EnvSource::Fixed(map) => map.get(key).cloned(),
        };
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

pub struct HostResolver {
    override_var: String,
    env: EnvSource,
    probe: Arc<dyn GatewayProbe>,
    cache: Option<HostCache>,
    ttl: Duration,
    memo: Mutex<Option<HostInfo>>,
}

pub struct HostResolverBuilder {
    override_var: String,
    env: EnvSource,
    probe: Arc<dyn GatewayProbe>,
    cache: Option<HostCache>,
    ttl: Duration,
}

impl HostResolverBuilder {
    /// Name of the primary override variable.
    pub fn override_var(mut self, var: impl Into<String>) -> Self {
        self.override_var = var.into();
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = EnvSource::Fixed(vars);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn GatewayProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn cache(mut self, cache: HostCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> HostResolver {
        HostResolver {
            override_var: self.override_var,
            env: self.env,
            probe: self.probe,
            cache: self.cache,
            ttl: self.ttl,
            memo: Mutex::new(None),
        }
    }
}

impl HostResolver {
    pub fn builder() -> HostResolverBuilder {
        HostResolverBuilder {
            override_var: DEFAULT_HOST_OVERRIDE_VAR.to_string(),
            env: EnvSource::Process,
            probe: Arc::new(ContainerGatewayProbe::default()),
            cache: None,
            ttl: DEFAULT_HOST_CACHE_TTL,
        }
    }

    /// Resolve the advertised host. Never fails.
    ///
    /// Overrides are always consulted first so a freshly set variable wins
    /// over a cached probe result. With `force`, cached values are ignored.
    pub async fn resolve(&self, force: bool) -> HostInfo {
        if let Some(host) = self.from_override().await {
            return self.remember(HostInfo::new(host, HostSource::Override));
        }

        if !force {
            if let Some(info) = self.cached() {
                return info;
            }
        }

        let info = match self.probe.probe().await {
            Ok(Some(gateway)) => {
                tracing::info!("Using container gateway {} as host address", gateway);
                HostInfo::new(gateway, HostSource::Gateway)
            }
            Ok(None) => HostInfo::fallback(),
            Err(e) => {
                tracing::warn!("Gateway probe failed: {}", e);
                HostInfo::fallback()
            }
        };
        self.remember(info)
    }

    async fn from_override(&self) -> Option<String> {
        if let Some(value) = self.env.get(&self.override_var) {
            if value.parse::<IpAddr>().is_ok() {
                tracing::debug!("Using {}={}", self.override_var, value);
                return Some(value);
            }
            tracing::warn!(
                "Ignoring {}='{}': not a valid IP address",
                self.override_var,
                value
            );
        }

        let external = self.env.get(EXTERNAL_HOST_VAR)?;
        if external.parse::<IpAddr>().is_ok() {
            return Some(external);
        }
        let lookup = tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((external.as_str(), 0))).await;
        let result = match lookup {
            Ok(Ok(mut addrs)) => match addrs.next() {
                Some(addr) => {
                    tracing::info!("Resolved {} {} to {}", EXTERNAL_HOST_VAR, external, addr.ip());
                    Some(addr.ip().to_string())
                }
                None => {
                    tracing::warn!("{} {} resolved to no addresses", EXTERNAL_HOST_VAR, external);
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Could not resolve {} {}: {}", EXTERNAL_HOST_VAR, external, e);
                None
            }
            Err(_) => {
                tracing::warn!("Timed out resolving {} {}", EXTERNAL_HOST_VAR, external);
                None
            }
        };
        result
    }

    /// Fresh memoized or on-disk result from a previous probe.
    fn cached(&self) -> Option<HostInfo> {
        let fresh = |info: &HostInfo| info.source != HostSource::Override && info.is_fresh(self.ttl);

        if let Some(info) = self.memo.lock().as_ref().filter(|i| fresh(i)) {
            return Some(info.clone());
        }
        let info = self
            .cache
            .as_ref()?
            .load_fresh(self.ttl)
            .filter(|i| i.source != HostSource::Override)?;
        *self.memo.lock() = Some(info.clone());
        Some(info)
    }

    fn remember(&self, info: HostInfo) -> HostInfo {
        if let Some(cache) = &self.cache {
            cache.store(&info);
        }
        *self.memo.lock() = Some(info.clone());
        info
    }
}
