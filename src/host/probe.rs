//! Default-gateway discovery for servers running inside a container.
//!
//! From inside a container the default gateway is normally the host, which
//! is the address clients outside the container can reach.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

const IP_ROUTE_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait GatewayProbe: Send + Sync {
    /// `Ok(None)` when the probe does not apply (e.g. not in a container).
    async fn probe(&self) -> Result<Option<String>>;
}

/// Reads `/proc/net/route`, falling back to `ip route show default`.
#[derive(Debug, Clone, Default)]
pub struct ContainerGatewayProbe {
    /// Probe even when no container markers are found
    pub always: bool,
}

#[async_trait]
impl GatewayProbe for ContainerGatewayProbe {
    async fn probe(&self) -> Result<Option<String>> {
        if !self.always && !in_container() {
            tracing::debug!("Not running in a container, skipping gateway probe");
            return Ok(None);
        }

        match std::fs::read_to_string("/proc/net/route") {
            Ok(table) => {
                if let Some(gw) = parse_proc_net_route(&table) {
                    return Ok(Some(gw.to_string()));
                }
            }
            Err(e) => tracing::debug!("Cannot read /proc/net/route: {}", e),
        }

        let output = tokio::time::timeout(
            IP_ROUTE_TIMEOUT,
            tokio::process::Command::new("ip")
                .args(["route", "show", "default"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::Resolution("'ip route' timed out".to_string()))?
        .map_err(|e| Error::Resolution(format!("cannot run 'ip route': {}", e)))?;

        if !output.status.success() {
            return Err(Error::Resolution(format!(
                "'ip route show default' exited with {}",
                output.status
            )));
        }
        Ok(parse_ip_route(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Container markers left by Docker, Podman and common runtimes.
pub fn in_container() -> bool {
    if Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists() {
        return true;
    }
    std::fs::read_to_string("/proc/1/cgroup")
        .map(|cg| {
            ["docker", "kubepods", "containerd", "lxc", "podman"]
                .iter()
                .any(|marker| cg.contains(marker))
        })
        .unwrap_or(false)
}

/// Gateway of the default route in `/proc/net/route`.
///
/// Columns are `Iface Destination Gateway Flags ...`, addresses in
/// little-endian hex. Flag 0x2 (RTF_GATEWAY) marks a gateway route.
pub fn parse_proc_net_route(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "00000000" {
            return None;
        }
        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & 0x2 == 0 {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        let addr = Ipv4Addr::from(raw.to_le_bytes());
        (!addr.is_unspecified()).then_some(addr)
    })
}

/// Address after `via` in `ip route show default` output.
pub fn parse_ip_route(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "via" {
                return parts
                    .next()
                    .filter(|ip| ip.parse::<std::net::IpAddr>().is_ok())
                    .map(str::to_string);
            }
        }
        None
    })
}
