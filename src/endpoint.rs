//! The view handed to downstream client-config generators.
//!
//! The supervisor does not write client-specific files. It exposes one
//! [`EndpointDescriptor`] per enabled entry and lets an [`EndpointEmitter`]
//! decide what to do with them.

use crate::config::ServerStore;
use crate::error::Result;
use crate::host::HostInfo;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub resolved_host: String,
    pub bind_port: Option<u16>,
    pub allow_origin: String,
    /// `http://<host>:<port>/sse`, absent when the entry has no port
    pub url: Option<String>,
}

/// Descriptors for every enabled entry, in config order.
pub fn endpoints(store: &ServerStore, host: &HostInfo) -> Vec<EndpointDescriptor> {
    store
        .enabled()
        .map(|spec| EndpointDescriptor {
            name: spec.name.clone(),
            resolved_host: host.resolved_host.clone(),
            bind_port: spec.bind_port,
            allow_origin: spec.allow_origin.clone(),
            url: spec
                .bind_port
                .map(|port| format!("http://{}:{}/sse", host.resolved_host, port)),
        })
        .collect()
}

/// Consumer of the endpoint view.
pub trait EndpointEmitter {
    fn emit(&mut self, endpoints: &[EndpointDescriptor]) -> Result<()>;
}

/// Writes the descriptors as a pretty JSON array.
pub struct JsonEmitter<W: Write> {
    out: W,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EndpointEmitter for JsonEmitter<W> {
    fn emit(&mut self, endpoints: &[EndpointDescriptor]) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.out, endpoints)?;
        writeln!(self.out)?;
        Ok(())
    }
}
