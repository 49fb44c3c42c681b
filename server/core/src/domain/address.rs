// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `protocol://path` addresses

use std::fmt;

use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::vfs::VfsError;

/// A parsed VFS address.
///
/// `path` is always normalized: it starts with `/`, has no empty, `.` or
/// `..` segments. Display renders `protocol:///path` (`home:///docs/a.txt`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsAddress {
    protocol: String,
    path: String,
}

impl VfsAddress {
    /// Parse and normalize an address; both `home://a` and `home:///a` are accepted
    pub fn parse(query: &str) -> Result<Self, VfsError> {
        let (protocol, rest) = query
            .split_once("://")
            .ok_or_else(|| VfsError::InvalidAddress(query.to_string()))?;

        if protocol.is_empty() || protocol.contains('/') {
            return Err(VfsError::InvalidAddress(query.to_string()));
        }

        let path = PathSanitizer::new().normalize(rest)?;

        Ok(Self {
            protocol: protocol.to_string(),
            path,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Normalized mount-relative path, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Last path segment; empty for the mount root
    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn parent(&self) -> Self {
        let parent = match self.path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => self.path[..idx].to_string(),
        };
        Self {
            protocol: self.protocol.clone(),
            path: parent,
        }
    }

    /// Append a single entry name
    pub fn join(&self, name: &str) -> Self {
        let name = name.trim_matches('/');
        let path = if self.is_root() {
            format!("/{}", name)
        } else {
            format!("{}/{}", self.path, name)
        };
        Self {
            protocol: self.protocol.clone(),
            path,
        }
    }
}

impl fmt::Display for VfsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.path)
    }
}
