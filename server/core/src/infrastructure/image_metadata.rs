// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded image metadata

use std::path::Path;

/// EXIF fields as `Tag: value` lines; `None` when the file carries none or
/// cannot be parsed.
pub fn read_exif(path: &Path) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let parsed = match exif::Reader::new().read_from_container(&mut reader) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No EXIF data");
            return None;
        }
    };

    let lines: Vec<String> = parsed
        .fields()
        .map(|field| format!("{}: {}", field.tag, field.display_value().with_unit(&parsed)))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_image_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        assert_eq!(read_exif(&path), None);
        assert_eq!(read_exif(&dir.path().join("missing.jpg")), None);
    }
}
