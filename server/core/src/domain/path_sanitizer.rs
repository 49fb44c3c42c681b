// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Normalizes the path half of a `protocol://path` address and keeps
//! resolved real paths inside their mount root.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Traversal prevention for VFS addresses

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Path sanitization errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathSanitizerError {
    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path outside mount boundary: {0}")]
    OutsideBoundary(String),

    #[error("Path too long: {0}")]
    PathTooLong(String),
}

/// Normalizes VFS paths and enforces mount containment.
///
/// # Guarantees
/// - Rejects any `..` segment
/// - Rejects NUL bytes
/// - Collapses repeated separators and `.` segments
/// - Output always starts with `/`
#[derive(Debug, Clone)]
pub struct PathSanitizer {
    /// Maximum allowed path length (default: 4096)
    max_path_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self { max_path_len: 4096 }
    }

    pub fn with_max_length(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Normalize a mount-relative path
    ///
    /// # Examples
    /// ```
    /// use cloudesk_core::domain::path_sanitizer::PathSanitizer;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert_eq!(sanitizer.normalize("docs//./a.txt").unwrap(), "/docs/a.txt");
    /// assert!(sanitizer.normalize("docs/../../etc/passwd").is_err());
    /// ```
    pub fn normalize(&self, path: &str) -> Result<String, PathSanitizerError> {
        if path.len() > self.max_path_len {
            return Err(PathSanitizerError::PathTooLong(path.to_string()));
        }

        if path.contains('\0') {
            tracing::warn!(path = %path, "Path contains null byte");
            return Err(PathSanitizerError::InvalidPath(
                "Path contains null byte".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for segment in path.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    tracing::warn!(
                        path = %path,
                        "Path traversal attempt detected: contains '..' segment"
                    );
                    return Err(PathSanitizerError::PathTraversal(path.to_string()));
                }
                part => segments.push(part),
            }
        }

        Ok(format!("/{}", segments.join("/")))
    }

    /// Join a normalized VFS path onto a real root, refusing anything that
    /// would land outside of it.
    pub fn contain(&self, root: &Path, normalized: &str) -> Result<PathBuf, PathSanitizerError> {
        let relative = normalized.trim_start_matches('/');
        let joined = if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(relative)
        };

        // `normalize` already dropped `..`, but a root template may carry one.
        let escapes = joined
            .components()
            .skip(root.components().count())
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));

        if escapes || !joined.starts_with(root) {
            tracing::warn!(
                path = %normalized,
                root = %root.display(),
                "Path outside mount boundary detected"
            );
            return Err(PathSanitizerError::OutsideBoundary(normalized.to_string()));
        }

        Ok(joined)
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
