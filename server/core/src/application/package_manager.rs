// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Package Manager
//!
//! Installs zipped application bundles into VFS directories and aggregates
//! the system and user package manifests.
//!
//! Installation decodes the archive on the blocking pool, then writes every
//! entry through its own VFS write stream with bounded concurrency. Any
//! failure after the destination was created removes the destination again.

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::application::vfs_dispatcher::VfsDispatcher;
use crate::domain::address::VfsAddress;
use crate::domain::file_info::FileInfo;
use crate::domain::package::{
    merge_manifests, PackageError, PackageManifest, PackageMetadata, PackageScope, MANIFEST_FILE,
    METADATA_FILE,
};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::session::Session;
use crate::domain::vfs::{VfsArgs, VfsError, VfsRequest, WriteOptions, WritePayload};

/// Entry writes in flight during one install
pub const DEFAULT_INSTALL_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
enum ArchiveEntry {
    Dir(String),
    File(String, Bytes),
}

pub struct PackageManager {
    vfs: Arc<VfsDispatcher>,
    system_manifest: PathBuf,
    user_paths: Vec<String>,
    concurrency: usize,
}

impl PackageManager {
    pub fn new(vfs: Arc<VfsDispatcher>, system_manifest: PathBuf, user_paths: Vec<String>) -> Self {
        Self {
            vfs,
            system_manifest,
            user_paths,
            concurrency: DEFAULT_INSTALL_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn user_paths(&self) -> &[String] {
        &self.user_paths
    }

    /// Extract the archive at `zip` into the new directory `dest`, then
    /// regenerate the user manifests of `paths`.
    pub async fn install(
        &self,
        session: &Session,
        zip: &str,
        dest: &str,
        paths: &[String],
    ) -> Result<(), PackageError> {
        let exists = VfsRequest::new(VfsArgs::Exists { path: dest.to_string() });
        match self.vfs.request(session, exists).await {
            Ok(_) => return Err(PackageError::AlreadyExists(dest.to_string())),
            Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let archive = self.vfs.read_bytes(session, zip).await?;

        let mkdir = VfsRequest::new(VfsArgs::Mkdir { path: dest.to_string() });
        self.vfs.request(session, mkdir).await?;

        if let Err(e) = self.extract(session, archive, dest).await {
            warn!(zip = %zip, dest = %dest, error = %e, "Package install failed, removing destination");
            let delete = VfsRequest::new(VfsArgs::Delete { path: dest.to_string() });
            if let Err(cleanup) = self.vfs.request(session, delete).await {
                warn!(dest = %dest, error = %cleanup, "Failed to remove partial package install");
            }
            return Err(e);
        }

        info!(zip = %zip, dest = %dest, "Installed package");

        if !paths.is_empty() {
            if let Err(e) = self.cache(session, "generate", Some(PackageScope::User), Some(paths)).await {
                warn!(error = %e, "Package installed but manifest regeneration failed");
            }
        }
        Ok(())
    }

    async fn extract(&self, session: &Session, archive: Bytes, dest: &str) -> Result<(), PackageError> {
        let entries = tokio::task::spawn_blocking(move || unpack(archive))
            .await
            .map_err(|e| PackageError::InvalidArchive(e.to_string()))??;
        let base = VfsAddress::parse(dest)?;

        let mut dirs: Vec<&str> = Vec::new();
        let mut files: Vec<(String, Bytes)> = Vec::new();
        for entry in &entries {
            match entry {
                ArchiveEntry::Dir(name) => dirs.push(name),
                ArchiveEntry::File(name, data) => files.push((base.join(name).to_string(), data.clone())),
            }
        }

        // Directories first, parents before children
        dirs.sort_unstable();
        for dir in dirs {
            let mut current = base.clone();
            for segment in dir.split('/') {
                current = current.join(segment);
                let mkdir = VfsRequest::new(VfsArgs::Mkdir { path: current.to_string() });
                match self.vfs.request(session, mkdir).await {
                    Ok(_) | Err(VfsError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let written = files.len();
        futures::stream::iter(files)
            .map(|(target, data)| async move {
                let mut sink = self.vfs.create_write_stream(session, &target).await?;
                sink.write_all(&data)
                    .await
                    .map_err(|e| VfsError::from_io(e, &target))?;
                sink.shutdown()
                    .await
                    .map_err(|e| VfsError::from_io(e, &target))?;
                Ok::<(), PackageError>(())
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        debug!(dest = %dest, files = written, "Extracted package archive");
        Ok(())
    }

    pub async fn uninstall(&self, session: &Session, path: &str) -> Result<(), PackageError> {
        let delete = VfsRequest::new(VfsArgs::Delete { path: path.to_string() });
        self.vfs.request(session, delete).await?;
        info!(path = %path, "Uninstalled package");
        Ok(())
    }

    /// Packages of one tier, or both merged with `system` winning conflicts
    pub async fn list(
        &self,
        session: &Session,
        scope: Option<PackageScope>,
        paths: Option<&[String]>,
    ) -> Result<PackageManifest, PackageError> {
        let user_paths = paths.unwrap_or(&self.user_paths);
        Ok(match scope {
            Some(PackageScope::System) => tag(self.system_packages().await?, PackageScope::System),
            Some(PackageScope::User) => tag(self.user_packages(session, user_paths).await?, PackageScope::User),
            None => merge_manifests(
                self.system_packages().await?,
                self.user_packages(session, user_paths).await?,
            ),
        })
    }

    /// Rebuild the `packages.json` of each user search path
    pub async fn cache(
        &self,
        session: &Session,
        action: &str,
        scope: Option<PackageScope>,
        paths: Option<&[String]>,
    ) -> Result<(), PackageError> {
        if action != "generate" || scope != Some(PackageScope::User) {
            return Err(PackageError::Unavailable(format!(
                "cache action '{}' for scope '{}'",
                action,
                scope.map(|s| s.as_str()).unwrap_or("none")
            )));
        }

        for path in paths.unwrap_or(&self.user_paths) {
            let manifest = self.generate_user_manifest(session, path).await?;
            debug!(path = %path, packages = manifest.len(), "Regenerated user package manifest");
        }
        Ok(())
    }

    /// System package whose directory contains the dist-relative `asset`
    pub async fn system_owner(&self, asset: &str) -> Result<Option<(String, PackageMetadata)>, PackageError> {
        let asset = asset.trim_start_matches('/');
        let owner = self
            .system_packages()
            .await?
            .into_iter()
            .filter(|(_, meta)| {
                let root = meta.path.trim_matches('/');
                !root.is_empty() && (asset == root || asset.starts_with(&format!("{}/", root)))
            })
            .max_by_key(|(_, meta)| meta.path.len());
        Ok(owner)
    }

    async fn system_packages(&self) -> Result<PackageManifest, PackageError> {
        read_system_manifest(&self.system_manifest).await
    }

    async fn user_packages(&self, session: &Session, paths: &[String]) -> Result<PackageManifest, PackageError> {
        let mut merged = PackageManifest::new();
        for path in paths {
            let manifest_path = VfsAddress::parse(path)?.join(MANIFEST_FILE).to_string();
            match self.vfs.read_bytes(session, &manifest_path).await {
                Ok(data) => {
                    let manifest: PackageManifest =
                        serde_json::from_slice(&data).map_err(|e| PackageError::InvalidManifest {
                            path: manifest_path.clone(),
                            reason: e.to_string(),
                        })?;
                    merged.extend(manifest);
                }
                Err(VfsError::NotFound(_)) => {
                    debug!(path = %manifest_path, "No user package manifest");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(merged)
    }

    async fn generate_user_manifest(&self, session: &Session, path: &str) -> Result<PackageManifest, PackageError> {
        let dir = VfsAddress::parse(path)?;
        let scandir = VfsRequest::new(VfsArgs::Scandir { path: path.to_string() });
        let listing = match self.vfs.request(session, scandir).await {
            Ok(reply) => reply.into_value()?,
            Err(VfsError::NotFound(_)) => {
                debug!(path = %path, "User package path does not exist");
                return Ok(PackageManifest::new());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<FileInfo> = serde_json::from_value(listing).map_err(|e| PackageError::InvalidManifest {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let mut manifest = PackageManifest::new();
        for entry in entries.iter().filter(|e| e.is_dir()) {
            let metadata_path = dir.join(&entry.filename).join(METADATA_FILE).to_string();
            let data = match self.vfs.read_bytes(session, &metadata_path).await {
                Ok(data) => data,
                Err(VfsError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<PackageMetadata>(&data) {
                Ok(mut metadata) => {
                    metadata.path = entry.path.clone();
                    metadata.scope = Some(PackageScope::User);
                    manifest.insert(entry.filename.clone(), metadata);
                }
                Err(e) => warn!(path = %metadata_path, error = %e, "Skipping invalid package metadata"),
            }
        }

        let body = serde_json::to_vec_pretty(&manifest).map_err(|e| PackageError::InvalidManifest {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let write = VfsRequest::new(VfsArgs::Write {
            path: dir.join(MANIFEST_FILE).to_string(),
            data: WritePayload::Bytes(Bytes::from(body)),
            options: WriteOptions::default(),
        });
        self.vfs.request(session, write).await?;
        Ok(manifest)
    }
}

fn tag(manifest: PackageManifest, scope: PackageScope) -> PackageManifest {
    manifest
        .into_iter()
        .map(|(id, meta)| (id, meta.with_scope(scope)))
        .collect()
}

/// A missing system manifest is an empty tier
pub async fn read_system_manifest(path: &Path) -> Result<PackageManifest, PackageError> {
    match tokio::fs::read(path).await {
        Ok(data) => serde_json::from_slice(&data).map_err(|e| PackageError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No system package manifest");
            Ok(PackageManifest::new())
        }
        Err(e) => Err(VfsError::from_io(e, &path.display().to_string()).into()),
    }
}

/// Archive-relative entry name, `None` for the archive root
fn entry_name(enclosed: Option<PathBuf>, raw: &str) -> Result<Option<String>, PackageError> {
    let escape = || PackageError::InvalidArchive(format!("entry escapes destination: {}", raw));
    let path = enclosed.ok_or_else(escape)?;
    let normalized = PathSanitizer::new()
        .normalize(&path.to_string_lossy())
        .map_err(|_| escape())?;
    if normalized == "/" {
        return Ok(None);
    }
    Ok(Some(normalized.trim_start_matches('/').to_string()))
}

fn unpack(archive: Bytes) -> Result<Vec<ArchiveEntry>, PackageError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| PackageError::InvalidArchive(e.to_string()))?;

    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| PackageError::InvalidArchive(e.to_string()))?;
        let raw = file.name().to_string();
        let Some(name) = entry_name(file.enclosed_name(), &raw)? else {
            continue;
        };

        if file.is_dir() {
            entries.push(ArchiveEntry::Dir(name));
        } else {
            let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
            file.read_to_end(&mut data)
                .map_err(|e| PackageError::InvalidArchive(format!("{}: {}", raw, e)))?;
            entries.push(ArchiveEntry::File(name, Bytes::from(data)));
        }
    }
    Ok(entries)
}
