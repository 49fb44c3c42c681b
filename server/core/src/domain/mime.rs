// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! MIME type lookup
//!
//! Resolution order: configured `mimes` table, built-in table, content
//! sniffing, `application/octet-stream`.

use std::collections::HashMap;

pub const DEFAULT_MIME: &str = "application/octet-stream";

const BUILTIN: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ico", "image/x-icon"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
];

#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    /// Lowercased extension without leading dot -> MIME type
    overrides: HashMap<String, String>,
}

impl MimeTable {
    /// Build from the configured table; keys may be written `.ext` or `ext`
    pub fn new(configured: &HashMap<String, String>) -> Self {
        let overrides = configured
            .iter()
            .map(|(ext, mime)| (ext.trim_start_matches('.').to_lowercase(), mime.clone()))
            .collect();
        Self { overrides }
    }

    /// Look up by file name only
    pub fn by_name(&self, filename: &str) -> Option<String> {
        let (_, ext) = filename.rsplit_once('.')?;
        let ext = ext.to_lowercase();
        self.overrides
            .get(&ext)
            .cloned()
            .or_else(|| {
                BUILTIN
                    .iter()
                    .find(|(e, _)| *e == ext)
                    .map(|(_, m)| m.to_string())
            })
    }

    /// Look up by name, then sniff `head` (first bytes of the file)
    pub fn detect(&self, filename: &str, head: &[u8]) -> String {
        self.by_name(filename)
            .or_else(|| infer::get(head).map(|t| t.mime_type().to_string()))
            .unwrap_or_else(|| DEFAULT_MIME.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_and_override() {
        let mut configured = HashMap::new();
        configured.insert(".txt".to_string(), "text/x-custom".to_string());
        let table = MimeTable::new(&configured);

        assert_eq!(table.by_name("a.TXT").as_deref(), Some("text/x-custom"));
        assert_eq!(table.by_name("a.png").as_deref(), Some("image/png"));
        assert_eq!(table.by_name("Makefile"), None);
    }

    #[test]
    fn test_sniff_fallback() {
        let table = MimeTable::default();
        let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(table.detect("picture", &png_header), "image/png");
        assert_eq!(table.detect("blob", b"\x00\x01"), DEFAULT_MIME);
    }
}
