// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Volume free space queries

use std::path::Path;

use crate::domain::vfs::VfsError;

/// Bytes available to unprivileged users on the volume holding `path`.
///
/// The nearest existing ancestor is queried, so a mount whose directory
/// has not been created yet still reports its volume.
#[cfg(unix)]
pub fn free_space(path: &Path) -> Result<u64, VfsError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let target = path
        .ancestors()
        .find(|p| p.exists())
        .ok_or_else(|| VfsError::NotFound(path.display().to_string()))?;

    let c_path = CString::new(target.as_os_str().as_bytes())
        .map_err(|_| VfsError::MalformedRequest("path contains a NUL byte".to_string()))?;

    // SAFETY: `stat` is a plain C struct filled by statvfs; `c_path` is a
    // valid NUL-terminated string that outlives the call.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(VfsError::Upstream(format!("statvfs {}: {}", target.display(), err)));
    }

    #[allow(clippy::unnecessary_cast)]
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn free_space(_path: &Path) -> Result<u64, VfsError> {
    Err(VfsError::Upstream("free space query is not supported on this platform".to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_free_space_of_missing_child() {
        let dir = tempfile::tempdir().unwrap();
        let existing = free_space(dir.path()).unwrap();
        let missing = free_space(&dir.path().join("not/yet/created")).unwrap();
        assert!(existing > 0);
        assert!(missing > 0);
    }
}
