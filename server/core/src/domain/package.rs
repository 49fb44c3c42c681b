// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Package manifests
//!
//! A manifest maps package identifiers to their metadata. The system tier
//! comes from one JSON file bundled with the distribution; the user tier is
//! aggregated from `packages.json` files under each configured search path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::vfs::VfsError;

/// Per-package metadata file looked up in every package directory
pub const METADATA_FILE: &str = "metadata.json";

/// Aggregate manifest written to each user search path
pub const MANIFEST_FILE: &str = "packages.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageScope {
    System,
    User,
}

impl PackageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageScope::System => "system",
            PackageScope::User => "user",
        }
    }
}

impl fmt::Display for PackageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageScope {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(PackageScope::System),
            "user" => Ok(PackageScope::User),
            other => Err(PackageError::Unavailable(format!("scope '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Location of the package directory (VFS address or dist-relative path)
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PackageScope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Groups allowed to launch the package (empty means everyone)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Everything else the package declares, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PackageMetadata {
    pub fn with_scope(mut self, scope: PackageScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

pub type PackageManifest = BTreeMap<String, PackageMetadata>;

/// Merge tiers; entries from `system` win over `user` on identical ids
pub fn merge_manifests(system: PackageManifest, user: PackageManifest) -> PackageManifest {
    let mut merged: PackageManifest = user
        .into_iter()
        .map(|(id, meta)| (id, meta.with_scope(PackageScope::User)))
        .collect();
    for (id, meta) in system {
        merged.insert(id, meta.with_scope(PackageScope::System));
    }
    merged
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("Package destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid package archive: {0}")]
    InvalidArchive(String),

    #[error("Invalid package manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

impl PackageError {
    pub fn status_code(&self) -> u16 {
        match self {
            PackageError::Vfs(e) => e.status_code(),
            PackageError::InvalidArchive(_) => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> PackageManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_metadata_passthrough() {
        let m = manifest(json!({
            "Writer": {"path": "default/Writer", "className": "ApplicationWriter", "icon": "w.png"}
        }));
        let writer = &m["Writer"];
        assert_eq!(writer.class_name.as_deref(), Some("ApplicationWriter"));
        assert_eq!(writer.extra["icon"], "w.png");

        let back = serde_json::to_value(writer).unwrap();
        assert_eq!(back["icon"], "w.png");
        assert_eq!(back["className"], "ApplicationWriter");
    }

    #[test]
    fn test_merge_system_wins() {
        let system = manifest(json!({"a": {"path": "sys/a"}, "shared": {"path": "sys/shared"}}));
        let user = manifest(json!({"b": {"path": "home:///b"}, "shared": {"path": "home:///shared"}}));
        let merged = merge_manifests(system, user);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a"].scope, Some(PackageScope::System));
        assert_eq!(merged["b"].scope, Some(PackageScope::User));
        assert_eq!(merged["shared"].path, "sys/shared");
        assert_eq!(merged["shared"].scope, Some(PackageScope::System));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("user".parse::<PackageScope>().unwrap(), PackageScope::User);
        assert!("global".parse::<PackageScope>().is_err());
    }
}
