// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mountpoints
//!
//! Bind a protocol name to a destination template and a transport. The
//! table is built once from configuration and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::vfs::{VfsError, VfsMethod};

/// Name of the local filesystem transport
pub const DEFAULT_TRANSPORT: &str = "__default__";

/// Name of the in-memory example transport
pub const EXAMPLE_TRANSPORT: &str = "example";

/// Mount consulted for protocols without an entry of their own
pub const WILDCARD_MOUNT: &str = "*";

/// Mount entry as written in configuration: either a bare destination
/// template or a full object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MountConfig {
    Template(String),
    Detailed(MountOptions),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub ro: bool,

    /// Groups allowed to access the mount (empty means everyone)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

fn default_transport() -> String {
    DEFAULT_TRANSPORT.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mountpoint {
    pub protocol: String,
    /// Destination template, `None` when the transport needs no real path
    pub destination: Option<String>,
    pub transport: String,
    pub enabled: bool,
    pub read_only: bool,
    pub groups: Vec<String>,
}

impl Mountpoint {
    pub fn from_config(protocol: &str, config: &MountConfig) -> Self {
        match config {
            MountConfig::Template(destination) => Self {
                protocol: protocol.to_string(),
                destination: Some(destination.clone()),
                transport: DEFAULT_TRANSPORT.to_string(),
                enabled: true,
                read_only: false,
                groups: Vec::new(),
            },
            MountConfig::Detailed(options) => Self {
                protocol: protocol.to_string(),
                destination: options.destination.clone(),
                transport: options.transport.clone(),
                enabled: options.enabled,
                read_only: options.ro,
                groups: options.groups.clone(),
            },
        }
    }

    /// Refuse disabled mounts and writes to read-only ones
    pub fn allows(&self, method: VfsMethod) -> Result<(), VfsError> {
        if !self.enabled || (self.read_only && method.is_write()) {
            tracing::debug!(
                protocol = %self.protocol,
                method = %method,
                enabled = self.enabled,
                read_only = self.read_only,
                "Mount refused operation"
            );
            return Err(VfsError::OperationDenied);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: BTreeMap<String, Mountpoint>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BTreeMap<String, MountConfig>) -> Self {
        let mounts = config
            .iter()
            .map(|(protocol, entry)| (protocol.clone(), Mountpoint::from_config(protocol, entry)))
            .collect();
        Self { mounts }
    }

    pub fn with_mount(mut self, protocol: &str, config: MountConfig) -> Self {
        self.mounts
            .insert(protocol.to_string(), Mountpoint::from_config(protocol, &config));
        self
    }

    /// Exact protocol match, then the wildcard mount
    pub fn lookup(&self, protocol: &str) -> Option<&Mountpoint> {
        self.mounts
            .get(protocol)
            .or_else(|| self.mounts.get(WILDCARD_MOUNT))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mountpoint> {
        self.mounts.values()
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
