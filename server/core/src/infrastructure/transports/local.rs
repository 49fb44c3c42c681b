// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Transport
//!
//! Default transport (`__default__`). Every address is resolved through the
//! [`PathResolver`](crate::domain::path_resolver::PathResolver) to a real
//! path under the mount destination and served with `tokio::fs`.
//!
//! **Blocking work:**
//! Recursive walks, tree copies, EXIF parsing and `statvfs` run on the
//! blocking pool via `spawn_blocking`.
//!
//! **Concurrency:**
//! Writes to the same path are not serialized; the last writer wins.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

use crate::domain::address::VfsAddress;
use crate::domain::file_info::{permission_string, sort_listing, FileInfo, FileKind};
use crate::domain::mime::{MimeTable, DEFAULT_MIME};
use crate::domain::mount::DEFAULT_TRANSPORT;
use crate::domain::path_resolver::ResolvedPath;
use crate::domain::transport::{
    data_url, decode_payload, ensure_deletable, json_reply, matches_query, upload_name, Transport,
    TransportContext,
};
use crate::domain::vfs::{
    ByteSink, ByteStream, FindOptions, ReadOptions, UploadedFile, VfsArgs, VfsError, VfsReply,
    VfsRequest,
};
use crate::infrastructure::{disk, image_metadata};

/// Bytes read for content sniffing
const SNIFF_LEN: usize = 512;

#[derive(Debug, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    fn resolve(&self, ctx: &TransportContext<'_>, query: &str) -> Result<(ResolvedPath, PathBuf), VfsError> {
        let resolved = ctx.resolver.resolve(query, ctx.session)?;
        let real = resolved.real_path()?.clone();
        Ok((resolved, real))
    }

    async fn exists(&self, ctx: &TransportContext<'_>, path: &str) -> Result<VfsReply, VfsError> {
        let (_, real) = self.resolve(ctx, path)?;
        match fs::try_exists(&real).await {
            Ok(true) => Ok(VfsReply::value(true)),
            Ok(false) => Err(VfsError::NotFound(path.to_string())),
            Err(e) => Err(VfsError::from_io(e, path)),
        }
    }

    async fn read(
        &self,
        ctx: &TransportContext<'_>,
        path: &str,
        options: &ReadOptions,
    ) -> Result<VfsReply, VfsError> {
        let (resolved, real) = self.resolve(ctx, path)?;
        let meta = fs::metadata(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        if meta.is_dir() {
            return Err(VfsError::MalformedRequest(format!("{} is a directory", path)));
        }
        let filename = resolved.address().basename().to_string();

        if options.raw && options.stream {
            let file = fs::File::open(&real).await.map_err(|e| VfsError::from_io(e, path))?;
            let mime = ctx
                .mimes
                .by_name(&filename)
                .unwrap_or_else(|| DEFAULT_MIME.to_string());
            return Ok(VfsReply::Stream {
                stream: Box::pin(ReaderStream::new(file)),
                mime,
                size: Some(meta.len()),
                filename,
            });
        }

        let data = fs::read(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        let mime = ctx.mimes.detect(&filename, &data[..data.len().min(SNIFF_LEN)]);
        if options.raw {
            Ok(VfsReply::Bytes {
                data: Bytes::from(data),
                mime,
            })
        } else {
            Ok(VfsReply::value(data_url(&mime, &data)))
        }
    }

    async fn upload(
        &self,
        ctx: &TransportContext<'_>,
        path: &str,
        overwrite: bool,
        file: &UploadedFile,
    ) -> Result<VfsReply, VfsError> {
        let name = upload_name(&file.filename)?;
        let target = VfsAddress::parse(path)?.join(&name).to_string();
        let (_, real) = self.resolve(ctx, &target)?;

        let exists = fs::try_exists(&real).await.map_err(|e| VfsError::from_io(e, &target))?;
        if exists && !overwrite {
            return Err(VfsError::AlreadyExists(target));
        }

        move_path(&file.temp_path, &real)
            .await
            .map_err(|e| VfsError::from_io(e, &target))?;
        tracing::debug!(target = %target, size = file.size, "Stored upload");
        Ok(VfsReply::value(true))
    }

    async fn delete(&self, ctx: &TransportContext<'_>, path: &str) -> Result<VfsReply, VfsError> {
        ensure_deletable(&VfsAddress::parse(path)?)?;
        let (_, real) = self.resolve(ctx, path)?;
        let meta = fs::symlink_metadata(&real)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&real).await
        } else {
            fs::remove_file(&real).await
        };
        removed.map_err(|e| VfsError::from_io(e, path))?;
        Ok(VfsReply::value(true))
    }

    /// Shared preconditions of `copy` and `move`; returns the real paths
    async fn prepare_transfer(
        &self,
        ctx: &TransportContext<'_>,
        src: &str,
        dest: &str,
    ) -> Result<(PathBuf, PathBuf, Metadata), VfsError> {
        let (_, src_real) = self.resolve(ctx, src)?;
        let (dest_resolved, dest_real) = self.resolve(ctx, dest)?;

        let src_meta = fs::metadata(&src_real).await.map_err(|e| VfsError::from_io(e, src))?;

        let parent = dest_resolved.address().parent().to_string();
        let parent_meta = match dest_real.parent() {
            Some(dir) => fs::metadata(dir).await.map_err(|e| VfsError::from_io(e, &parent))?,
            None => return Err(VfsError::NotFound(parent)),
        };
        if !parent_meta.is_dir() {
            return Err(VfsError::NotFound(parent));
        }
        if parent_meta.permissions().readonly() {
            return Err(VfsError::PermissionDenied(format!("{} is not writable", parent)));
        }

        if fs::try_exists(&dest_real).await.map_err(|e| VfsError::from_io(e, dest))? {
            return Err(VfsError::AlreadyExists(dest.to_string()));
        }
        if src_meta.is_dir() && dest_real.starts_with(&src_real) {
            return Err(VfsError::MalformedRequest(format!(
                "cannot place {} inside itself",
                src
            )));
        }

        Ok((src_real, dest_real, src_meta))
    }

    async fn copy(&self, ctx: &TransportContext<'_>, src: &str, dest: &str) -> Result<VfsReply, VfsError> {
        let (src_real, dest_real, src_meta) = self.prepare_transfer(ctx, src, dest).await?;
        if src_meta.is_dir() {
            tokio::task::spawn_blocking(move || copy_tree(&src_real, &dest_real))
                .await
                .map_err(|e| VfsError::Io(e.to_string()))?
                .map_err(|e| VfsError::from_io(e, dest))?;
        } else {
            fs::copy(&src_real, &dest_real)
                .await
                .map_err(|e| VfsError::from_io(e, dest))?;
        }
        Ok(VfsReply::value(true))
    }

    async fn rename(&self, ctx: &TransportContext<'_>, src: &str, dest: &str) -> Result<VfsReply, VfsError> {
        let (src_real, dest_real, _) = self.prepare_transfer(ctx, src, dest).await?;
        move_path(&src_real, &dest_real)
            .await
            .map_err(|e| VfsError::from_io(e, dest))?;
        Ok(VfsReply::value(true))
    }

    async fn mkdir(&self, ctx: &TransportContext<'_>, path: &str) -> Result<VfsReply, VfsError> {
        let (_, real) = self.resolve(ctx, path)?;
        if fs::try_exists(&real).await.map_err(|e| VfsError::from_io(e, path))? {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        fs::create_dir_all(&real)
            .await
            .map_err(|e| VfsError::from_io(e, path))?;
        Ok(VfsReply::value(true))
    }

    async fn find(
        &self,
        ctx: &TransportContext<'_>,
        path: &str,
        options: FindOptions,
    ) -> Result<VfsReply, VfsError> {
        let (resolved, real) = self.resolve(ctx, path)?;
        let meta = fs::metadata(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        if !meta.is_dir() {
            return Err(VfsError::MalformedRequest(format!("{} is not a directory", path)));
        }

        let base = resolved.address().clone();
        let mimes = ctx.mimes.clone();
        let recursive = options.recursive;
        let mut found = tokio::task::spawn_blocking(move || find_blocking(&real, &base, &mimes, &options))
            .await
            .map_err(|e| VfsError::Io(e.to_string()))?;

        if !recursive {
            sort_listing(&mut found);
        }
        json_reply(&found)
    }

    async fn fileinfo(&self, ctx: &TransportContext<'_>, path: &str) -> Result<VfsReply, VfsError> {
        let (resolved, real) = self.resolve(ctx, path)?;
        let meta = fs::metadata(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        let mut info = build_info(ctx.mimes, resolved.address(), &meta);

        if meta.is_file() {
            let head = read_head(&real).await.map_err(|e| VfsError::from_io(e, path))?;
            let mime = ctx.mimes.detect(&info.filename, &head);
            if mime.starts_with("image/") {
                let image = real.clone();
                info.exif = tokio::task::spawn_blocking(move || image_metadata::read_exif(&image))
                    .await
                    .ok()
                    .flatten();
            }
            info.mime = Some(mime);
        }

        json_reply(&info)
    }

    async fn scandir(&self, ctx: &TransportContext<'_>, path: &str) -> Result<VfsReply, VfsError> {
        let (resolved, real) = self.resolve(ctx, path)?;
        let mut dir = fs::read_dir(&real).await.map_err(|e| VfsError::from_io(e, path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| VfsError::from_io(e, path))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follow symlinks, fall back to the link itself when dangling
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(_) => match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        tracing::debug!(entry = %name, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                },
            };
            entries.push(build_info(ctx.mimes, &resolved.address().join(&name), &meta));
        }

        sort_listing(&mut entries);
        json_reply(&entries)
    }

    async fn free_space(&self, ctx: &TransportContext<'_>, root: &str) -> Result<VfsReply, VfsError> {
        let (_, real) = self.resolve(ctx, root)?;
        let free = tokio::task::spawn_blocking(move || disk::free_space(&real))
            .await
            .map_err(|e| VfsError::Io(e.to_string()))??;
        Ok(VfsReply::value(free))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        DEFAULT_TRANSPORT
    }

    async fn request(&self, ctx: &TransportContext<'_>, request: VfsRequest) -> Result<VfsReply, VfsError> {
        match request.args {
            VfsArgs::Exists { path } => self.exists(ctx, &path).await,
            VfsArgs::Read { path, options } => self.read(ctx, &path, &options).await,
            VfsArgs::Write { path, data, options } => {
                let (_, real) = self.resolve(ctx, &path)?;
                let bytes = decode_payload(data, &options)?;
                fs::write(&real, &bytes)
                    .await
                    .map_err(|e| VfsError::from_io(e, &path))?;
                Ok(VfsReply::value(true))
            }
            VfsArgs::Upload { path, overwrite, file } => {
                let result = self.upload(ctx, &path, overwrite, &file).await;
                if let Err(e) = fs::remove_file(&file.temp_path).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(temp = %file.temp_path.display(), error = %e, "Failed to remove upload temp file");
                    }
                }
                result
            }
            VfsArgs::Delete { path } => self.delete(ctx, &path).await,
            VfsArgs::Copy { src, dest } => self.copy(ctx, &src, &dest).await,
            VfsArgs::Move { src, dest } => self.rename(ctx, &src, &dest).await,
            VfsArgs::Mkdir { path } => self.mkdir(ctx, &path).await,
            VfsArgs::Find { path, options } => self.find(ctx, &path, options).await,
            VfsArgs::FileInfo { path } => self.fileinfo(ctx, &path).await,
            VfsArgs::Scandir { path } => self.scandir(ctx, &path).await,
            VfsArgs::FreeSpace { root } => self.free_space(ctx, &root).await,
        }
    }

    async fn create_read_stream(&self, ctx: &TransportContext<'_>, path: &str) -> Result<ByteStream, VfsError> {
        let (_, real) = self.resolve(ctx, path)?;
        let file = fs::File::open(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    /// Missing parent directories are created
    async fn create_write_stream(&self, ctx: &TransportContext<'_>, path: &str) -> Result<ByteSink, VfsError> {
        let (_, real) = self.resolve(ctx, path)?;
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(e, path))?;
        }
        let file = fs::File::create(&real).await.map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::pin(file))
    }
}

fn to_utc(time: io::Result<std::time::SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn mode_of(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

/// Listing record; MIME comes from the name only
fn build_info(mimes: &MimeTable, address: &VfsAddress, meta: &Metadata) -> FileInfo {
    let is_dir = meta.is_dir();
    let filename = address.basename().to_string();
    let mime = if is_dir {
        None
    } else {
        Some(mimes.by_name(&filename).unwrap_or_else(|| DEFAULT_MIME.to_string()))
    };

    FileInfo {
        filename,
        path: address.to_string(),
        size: if is_dir { 0 } else { meta.len() },
        mime,
        kind: if is_dir { FileKind::Dir } else { FileKind::File },
        permissions: permission_string(mode_of(meta)),
        ctime: to_utc(meta.created()),
        mtime: to_utc(meta.modified()),
        exif: None,
    }
}

async fn read_head(path: &Path) -> io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}

fn find_blocking(root: &Path, base: &VfsAddress, mimes: &MimeTable, options: &FindOptions) -> Vec<FileInfo> {
    let limit = options.limit.filter(|limit| *limit > 0);
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry during find");
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy();
        if !matches_query(&name, &options.query) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let address = relative
            .components()
            .fold(base.clone(), |addr, part| addr.join(&part.as_os_str().to_string_lossy()));

        match entry.metadata() {
            Ok(meta) => found.push(build_info(mimes, &address, &meta)),
            Err(e) => {
                tracing::debug!(entry = %address, error = %e, "Skipping entry without metadata");
                continue;
            }
        }

        if limit.is_some_and(|limit| found.len() >= limit) {
            break;
        }
    }

    found
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Rename, falling back to copy and delete across filesystems
async fn move_path(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let meta = fs::metadata(src).await?;
            if meta.is_dir() {
                let (from, to) = (src.to_path_buf(), dest.to_path_buf());
                tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                    .await
                    .map_err(io::Error::other)??;
                fs::remove_dir_all(src).await
            } else {
                fs::copy(src, dest).await?;
                fs::remove_file(src).await
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mount::{MountConfig, MountOptions, MountTable};
    use crate::domain::path_resolver::{PathResolver, ResolverEnv};
    use crate::domain::session::{Session, UserProfile};
    use crate::domain::vfs::{RawType, VfsMethod, WriteOptions, WritePayload};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        resolver: PathResolver,
        session: Session,
        mimes: MimeTable,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            std::fs::create_dir_all(root.join("alice")).unwrap();
            let mounts = MountTable::new()
                .with_mount("home", MountConfig::Template(format!("{}/%USERNAME%", root.display())))
                .with_mount(
                    "apps",
                    MountConfig::Detailed(MountOptions {
                        destination: Some(format!("{}/apps", root.display())),
                        transport: DEFAULT_TRANSPORT.to_string(),
                        enabled: true,
                        ro: true,
                        groups: vec![],
                    }),
                );
            let resolver = PathResolver::new(Arc::new(mounts), ResolverEnv::default());
            let session = Session::new("s").with_user(UserProfile {
                id: "1".to_string(),
                username: "alice".to_string(),
                name: "Alice".to_string(),
                groups: vec![],
            });
            Self {
                _dir: dir,
                root,
                resolver,
                session,
                mimes: MimeTable::default(),
            }
        }

        fn ctx(&self) -> TransportContext<'_> {
            TransportContext {
                resolver: &self.resolver,
                session: &self.session,
                mimes: &self.mimes,
            }
        }

        fn home(&self) -> PathBuf {
            self.root.join("alice")
        }

        async fn call(&self, method: VfsMethod, args: Value) -> Result<VfsReply, VfsError> {
            let request = VfsRequest::from_json(method, &args, &mut Vec::new()).unwrap();
            LocalTransport::new().request(&self.ctx(), request).await
        }
    }

    #[tokio::test]
    async fn test_write_then_read_raw() {
        let fx = Fixture::new();
        let request = VfsRequest::new(VfsArgs::Write {
            path: "home:///hello.txt".to_string(),
            data: WritePayload::Text("hello".to_string()),
            options: WriteOptions { raw: true, rawtype: RawType::Utf8 },
        });
        LocalTransport::new().request(&fx.ctx(), request).await.unwrap();

        let reply = fx
            .call(VfsMethod::Read, json!({"path": "home:///hello.txt", "options": {"raw": true, "stream": false}}))
            .await
            .unwrap();
        match reply {
            VfsReply::Bytes { data, mime } => {
                assert_eq!(&data[..], b"hello");
                assert_eq!(mime, "text/plain");
            }
            other => panic!("unexpected reply: {:?}", other),
        }

        let streamed = fx
            .call(VfsMethod::Read, json!({"path": "home:///hello.txt"}))
            .await
            .unwrap();
        assert!(matches!(streamed, VfsReply::Stream { size: Some(5), .. }));
        assert_eq!(&streamed.into_bytes().await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_read_data_url() {
        let fx = Fixture::new();
        std::fs::write(fx.home().join("a.bin"), [0u8, 1, 2, 255]).unwrap();
        let reply = fx
            .call(VfsMethod::Read, json!({"path": "home:///a.bin", "options": {"raw": false}}))
            .await
            .unwrap();
        let url = reply.into_value().unwrap();
        assert_eq!(url, json!("data:application/octet-stream;base64,AAEC/w=="));
    }

    #[tokio::test]
    async fn test_exists_and_missing() {
        let fx = Fixture::new();
        std::fs::write(fx.home().join("a.txt"), "x").unwrap();
        let reply = fx.call(VfsMethod::Exists, json!({"path": "home:///a.txt"})).await.unwrap();
        assert_eq!(reply.into_value().unwrap(), json!(true));

        let err = fx.call(VfsMethod::Exists, json!({"path": "home:///b.txt"})).await.unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mkdir_twice_rejects() {
        let fx = Fixture::new();
        fx.call(VfsMethod::Mkdir, json!({"path": "home:///docs"})).await.unwrap();
        assert!(fx.home().join("docs").is_dir());
        let err = fx.call(VfsMethod::Mkdir, json!({"path": "home:///docs"})).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_root_always_denied() {
        let fx = Fixture::new();
        for path in ["home://", "home:///", "home://."] {
            let err = fx.call(VfsMethod::Delete, json!({ "path": path })).await.unwrap_err();
            assert!(matches!(err, VfsError::PermissionDenied(_)), "{}", path);
        }
        assert!(fx.home().is_dir());
    }

    #[tokio::test]
    async fn test_delete_file_and_dir() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.home().join("d/e")).unwrap();
        std::fs::write(fx.home().join("d/e/f.txt"), "x").unwrap();
        fx.call(VfsMethod::Delete, json!({"path": "home:///d"})).await.unwrap();
        assert!(!fx.home().join("d").exists());
    }

    #[tokio::test]
    async fn test_copy_and_move() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.home().join("src/nested")).unwrap();
        std::fs::write(fx.home().join("src/nested/a.txt"), "a").unwrap();

        fx.call(VfsMethod::Copy, json!({"src": "home:///src", "dest": "home:///copy"}))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(fx.home().join("copy/nested/a.txt")).unwrap(), "a");

        let err = fx
            .call(VfsMethod::Copy, json!({"src": "home:///src", "dest": "home:///copy"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));

        let err = fx
            .call(VfsMethod::Copy, json!({"src": "home:///missing", "dest": "home:///x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));

        let err = fx
            .call(VfsMethod::Move, json!({"src": "home:///copy", "dest": "home:///nope/x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));

        fx.call(VfsMethod::Move, json!({"src": "home:///copy", "dest": "home:///moved"}))
            .await
            .unwrap();
        assert!(!fx.home().join("copy").exists());
        assert!(fx.home().join("moved/nested/a.txt").exists());
    }

    #[tokio::test]
    async fn test_find_non_recursive_and_recursive() {
        let fx = Fixture::new();
        std::fs::write(fx.home().join("Report.TXT"), "").unwrap();
        std::fs::write(fx.home().join("notes.md"), "").unwrap();
        std::fs::create_dir_all(fx.home().join("txt-archive/deep")).unwrap();
        std::fs::write(fx.home().join("txt-archive/deep/old.txt"), "").unwrap();

        let reply = fx
            .call(VfsMethod::Find, json!({"path": "home:///", "args": {"query": "txt"}}))
            .await
            .unwrap();
        let found: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        let names: Vec<_> = found.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["txt-archive", "Report.TXT"]);

        let reply = fx
            .call(
                VfsMethod::Find,
                json!({"path": "home:///", "args": {"query": "txt", "recursive": true}}),
            )
            .await
            .unwrap();
        let found: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        let mut paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["home:///Report.TXT", "home:///txt-archive", "home:///txt-archive/deep/old.txt"]
        );

        let reply = fx
            .call(
                VfsMethod::Find,
                json!({"path": "home:///", "args": {"query": "txt", "recursive": true, "limit": 1}}),
            )
            .await
            .unwrap();
        let found: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_scandir_and_fileinfo() {
        let fx = Fixture::new();
        std::fs::write(fx.home().join("b.txt"), "bb").unwrap();
        std::fs::create_dir(fx.home().join("a-dir")).unwrap();

        let reply = fx.call(VfsMethod::Scandir, json!({"path": "home:///"})).await.unwrap();
        let entries: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "a-dir");
        assert_eq!(entries[0].kind, FileKind::Dir);
        assert_eq!(entries[1].path, "home:///b.txt");
        assert_eq!(entries[1].size, 2);

        let reply = fx.call(VfsMethod::FileInfo, json!({"path": "home:///b.txt"})).await.unwrap();
        let info: FileInfo = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(info.mime.as_deref(), Some("text/plain"));
        assert_eq!(info.exif, None);
    }

    #[tokio::test]
    async fn test_fileinfo_image_without_exif() {
        let fx = Fixture::new();
        std::fs::write(fx.home().join("pic.png"), [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        let reply = fx.call(VfsMethod::FileInfo, json!({"path": "home:///pic.png"})).await.unwrap();
        let info: FileInfo = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(info.mime.as_deref(), Some("image/png"));
        assert_eq!(info.exif, None);
    }

    #[tokio::test]
    async fn test_upload_respects_overwrite_and_cleans_temp() {
        let fx = Fixture::new();
        let temp = fx.root.join("upload-1");
        std::fs::write(&temp, "new").unwrap();
        std::fs::write(fx.home().join("a.txt"), "old").unwrap();

        let file = UploadedFile {
            filename: "a.txt".to_string(),
            temp_path: temp.clone(),
            size: 3,
            mime: None,
        };
        let request = VfsRequest::new(VfsArgs::Upload {
            path: "home:///".to_string(),
            overwrite: false,
            file: file.clone(),
        });
        let err = LocalTransport::new().request(&fx.ctx(), request).await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));
        assert!(!temp.exists());
        assert_eq!(std::fs::read_to_string(fx.home().join("a.txt")).unwrap(), "old");

        std::fs::write(&temp, "new").unwrap();
        let request = VfsRequest::new(VfsArgs::Upload {
            path: "home:///".to_string(),
            overwrite: true,
            file,
        });
        LocalTransport::new().request(&fx.ctx(), request).await.unwrap();
        assert!(!temp.exists());
        assert_eq!(std::fs::read_to_string(fx.home().join("a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_free_space() {
        let fx = Fixture::new();
        let reply = fx.call(VfsMethod::FreeSpace, json!({"root": "home:///"})).await.unwrap();
        assert!(reply.into_value().unwrap().as_u64().is_some());
    }

    #[tokio::test]
    async fn test_streams() {
        use futures::TryStreamExt;
        use tokio::io::AsyncWriteExt;

        let fx = Fixture::new();
        let transport = LocalTransport::new();
        let mut sink = transport
            .create_write_stream(&fx.ctx(), "home:///new/dir/file.txt")
            .await
            .unwrap();
        sink.write_all(b"streamed").await.unwrap();
        sink.shutdown().await.unwrap();

        let stream = transport
            .create_read_stream(&fx.ctx(), "home:///new/dir/file.txt")
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"streamed");
    }
}
