// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! File Info record returned by listings and `fileinfo`.
//!
//! Produced fresh for every call; nothing here is cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    /// VFS address of the entry
    pub path: String,
    pub size: u64,
    pub mime: Option<String>,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// `rwxr-xr-x` style mode string
    pub permissions: String,
    pub ctime: Option<DateTime<Utc>>,
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif: Option<String>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

/// Directories first, then by name ignoring case
pub fn sort_listing(entries: &mut [FileInfo]) {
    entries.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.filename.to_lowercase().cmp(&b.filename.to_lowercase()))
    });
}

/// Render the nine permission bits of a POSIX mode
pub fn permission_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_string() {
        assert_eq!(permission_string(0o755), "rwxr-xr-x");
        assert_eq!(permission_string(0o100644), "rw-r--r--");
        assert_eq!(permission_string(0), "---------");
    }

    fn entry(name: &str, kind: FileKind) -> FileInfo {
        FileInfo {
            filename: name.to_string(),
            path: format!("home:///{}", name),
            size: 0,
            mime: None,
            kind,
            permissions: String::new(),
            ctime: None,
            mtime: None,
            exif: None,
        }
    }

    #[test]
    fn test_sort_listing() {
        let mut entries = vec![
            entry("b.txt", FileKind::File),
            entry("Zeta", FileKind::Dir),
            entry("A.txt", FileKind::File),
            entry("alpha", FileKind::Dir),
        ];
        sort_listing(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "A.txt", "b.txt"]);
    }

    #[test]
    fn test_serialized_shape() {
        let info = FileInfo {
            filename: "a.txt".to_string(),
            path: "home:///a.txt".to_string(),
            size: 5,
            mime: Some("text/plain".to_string()),
            kind: FileKind::File,
            permissions: "rw-r--r--".to_string(),
            ctime: None,
            mtime: None,
            exif: None,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["filename"], "a.txt");
        assert!(value.get("exif").is_none());
    }
}
