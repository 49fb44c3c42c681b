// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Transport
//!
//! The `example` transport: a process-local tree keyed by VFS address. It
//! needs no mount destination and serves as the reference for writing new
//! transports as well as a test double.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

use crate::domain::address::VfsAddress;
use crate::domain::file_info::{sort_listing, FileInfo, FileKind};
use crate::domain::mime::MimeTable;
use crate::domain::mount::EXAMPLE_TRANSPORT;
use crate::domain::transport::{
    data_url, decode_payload, ensure_deletable, json_reply, matches_query, upload_name, Transport,
    TransportContext,
};
use crate::domain::vfs::{ByteSink, ByteStream, VfsArgs, VfsError, VfsReply, VfsRequest};

const DEFAULT_CAPACITY: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
enum Node {
    Dir { mtime: DateTime<Utc> },
    File { data: Bytes, mtime: DateTime<Utc> },
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }
}

/// Entries keyed by `protocol` then normalized path; mount roots are implicit
type Tree = BTreeMap<(String, String), Node>;

pub struct MemoryTransport {
    tree: Arc<RwLock<Tree>>,
    capacity: u64,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Writes that would push stored bytes past `capacity` are refused;
    /// `freeSpace` reports what is left
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            tree: Arc::new(RwLock::new(BTreeMap::new())),
            capacity,
        }
    }

    fn key(address: &VfsAddress) -> (String, String) {
        (address.protocol().to_string(), address.path().to_string())
    }

    fn lookup(&self, address: &VfsAddress) -> Option<Node> {
        if address.is_root() {
            return Some(Node::Dir { mtime: Utc::now() });
        }
        self.tree.read().get(&Self::key(address)).cloned()
    }

    fn require_dir(&self, address: &VfsAddress) -> Result<(), VfsError> {
        match self.lookup(address) {
            Some(node) if node.is_dir() => Ok(()),
            _ => Err(VfsError::NotFound(address.to_string())),
        }
    }

    fn put_file(&self, address: &VfsAddress, data: Bytes) -> Result<(), VfsError> {
        self.require_dir(&address.parent())?;
        if self.lookup(address).is_some_and(|node| node.is_dir()) {
            return Err(VfsError::AlreadyExists(address.to_string()));
        }
        let key = Self::key(address);
        let mut tree = self.tree.write();
        ensure_room(&tree, &key, data.len() as u64, self.capacity)?;
        tree.insert(
            key,
            Node::File {
                data,
                mtime: Utc::now(),
            },
        );
        Ok(())
    }

    /// Keys of `address` and everything below it
    fn subtree(tree: &Tree, address: &VfsAddress) -> Vec<(String, String)> {
        let protocol = address.protocol();
        let prefix = format!("{}/", address.path().trim_end_matches('/'));
        tree.keys()
            .filter(|(p, path)| p == protocol && (path == address.path() || path.starts_with(&prefix)))
            .cloned()
            .collect()
    }

    /// Direct children of a directory
    fn children(&self, dir: &VfsAddress) -> Vec<(VfsAddress, Node)> {
        let tree = self.tree.read();
        tree.iter()
            .filter(|((protocol, path), _)| {
                protocol == dir.protocol() && path != dir.path() && {
                    let parent = match path.rfind('/') {
                        Some(0) | None => "/",
                        Some(idx) => &path[..idx],
                    };
                    parent == dir.path()
                }
            })
            .map(|((_, path), node)| (dir.join(path.rsplit('/').next().unwrap_or("")), node.clone()))
            .collect()
    }

    fn info(mimes: &MimeTable, address: &VfsAddress, node: &Node) -> FileInfo {
        let filename = address.basename().to_string();
        let (kind, size, mime, mtime) = match node {
            Node::Dir { mtime } => (FileKind::Dir, 0, None, *mtime),
            Node::File { data, mtime } => (
                FileKind::File,
                data.len() as u64,
                Some(mimes.detect(&filename, &data[..data.len().min(512)])),
                *mtime,
            ),
        };
        FileInfo {
            filename,
            path: address.to_string(),
            size,
            mime,
            kind,
            permissions: "rw-rw-rw-".to_string(),
            ctime: Some(mtime),
            mtime: Some(mtime),
            exif: None,
        }
    }

    fn transfer(&self, src: &str, dest: &str, remove_src: bool) -> Result<VfsReply, VfsError> {
        let src = VfsAddress::parse(src)?;
        let dest = VfsAddress::parse(dest)?;
        if src.is_root() {
            return Err(VfsError::PermissionDenied(format!("refusing to transfer {}", src)));
        }
        if self.lookup(&src).is_none() {
            return Err(VfsError::NotFound(src.to_string()));
        }
        self.require_dir(&dest.parent())?;
        if self.lookup(&dest).is_some() {
            return Err(VfsError::AlreadyExists(dest.to_string()));
        }
        if src.protocol() == dest.protocol() && dest.path().starts_with(&format!("{}/", src.path())) {
            return Err(VfsError::MalformedRequest(format!("cannot place {} inside itself", src)));
        }

        let mut tree = self.tree.write();
        if !remove_src {
            let copied: u64 = Self::subtree(&tree, &src)
                .iter()
                .filter_map(|key| tree.get(key))
                .map(node_size)
                .sum();
            if used_in(&tree) + copied > self.capacity {
                return Err(full(self.capacity));
            }
        }
        let src_root_len = src.path().len();
        for key in Self::subtree(&tree, &src) {
            let Some(node) = tree.get(&key).cloned() else {
                continue;
            };
            let suffix = &key.1[src_root_len..];
            let target = (dest.protocol().to_string(), format!("{}{}", dest.path(), suffix));
            if remove_src {
                tree.remove(&key);
            }
            tree.insert(target, node);
        }
        Ok(VfsReply::value(true))
    }

    fn used(&self) -> u64 {
        used_in(&self.tree.read())
    }
}

fn node_size(node: &Node) -> u64 {
    match node {
        Node::File { data, .. } => data.len() as u64,
        Node::Dir { .. } => 0,
    }
}

fn used_in(tree: &Tree) -> u64 {
    tree.values().map(node_size).sum()
}

fn full(capacity: u64) -> VfsError {
    VfsError::Upstream(format!("memory transport is full ({} bytes)", capacity))
}

/// Room for `incoming` bytes at `key`, counting the file it replaces as freed
fn ensure_room(tree: &Tree, key: &(String, String), incoming: u64, capacity: u64) -> Result<(), VfsError> {
    let replaced = tree.get(key).map(node_size).unwrap_or(0);
    if used_in(tree) - replaced + incoming > capacity {
        return Err(full(capacity));
    }
    Ok(())
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        EXAMPLE_TRANSPORT
    }

    async fn request(&self, ctx: &TransportContext<'_>, request: VfsRequest) -> Result<VfsReply, VfsError> {
        match request.args {
            VfsArgs::Exists { path } => {
                let address = VfsAddress::parse(&path)?;
                match self.lookup(&address) {
                    Some(_) => Ok(VfsReply::value(true)),
                    None => Err(VfsError::NotFound(path)),
                }
            }
            VfsArgs::Read { path, options } => {
                let address = VfsAddress::parse(&path)?;
                let data = match self.lookup(&address) {
                    Some(Node::File { data, .. }) => data,
                    Some(Node::Dir { .. }) => {
                        return Err(VfsError::MalformedRequest(format!("{} is a directory", path)))
                    }
                    None => return Err(VfsError::NotFound(path)),
                };
                let filename = address.basename().to_string();
                let mime = ctx.mimes.detect(&filename, &data[..data.len().min(512)]);
                if !options.raw {
                    return Ok(VfsReply::value(data_url(&mime, &data)));
                }
                if options.stream {
                    let size = data.len() as u64;
                    let stream = futures::stream::iter([Ok::<_, io::Error>(data)]);
                    return Ok(VfsReply::Stream {
                        stream: Box::pin(stream),
                        mime,
                        size: Some(size),
                        filename,
                    });
                }
                Ok(VfsReply::Bytes { data, mime })
            }
            VfsArgs::Write { path, data, options } => {
                let address = VfsAddress::parse(&path)?;
                self.put_file(&address, decode_payload(data, &options)?)?;
                Ok(VfsReply::value(true))
            }
            VfsArgs::Upload { path, overwrite, file } => {
                let stored = async {
                    let name = upload_name(&file.filename)?;
                    let target = VfsAddress::parse(&path)?.join(&name);
                    if self.lookup(&target).is_some() && !overwrite {
                        return Err(VfsError::AlreadyExists(target.to_string()));
                    }
                    let data = tokio::fs::read(&file.temp_path)
                        .await
                        .map_err(|e| VfsError::from_io(e, &file.filename))?;
                    self.put_file(&target, Bytes::from(data))
                }
                .await;
                if let Err(e) = tokio::fs::remove_file(&file.temp_path).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(temp = %file.temp_path.display(), error = %e, "Failed to remove upload temp file");
                    }
                }
                stored.map(|_| VfsReply::value(true))
            }
            VfsArgs::Delete { path } => {
                let address = VfsAddress::parse(&path)?;
                ensure_deletable(&address)?;
                let mut tree = self.tree.write();
                let keys = Self::subtree(&tree, &address);
                if keys.is_empty() {
                    return Err(VfsError::NotFound(path));
                }
                for key in keys {
                    tree.remove(&key);
                }
                Ok(VfsReply::value(true))
            }
            VfsArgs::Copy { src, dest } => self.transfer(&src, &dest, false),
            VfsArgs::Move { src, dest } => self.transfer(&src, &dest, true),
            VfsArgs::Mkdir { path } => {
                let address = VfsAddress::parse(&path)?;
                if self.lookup(&address).is_some() {
                    return Err(VfsError::AlreadyExists(path));
                }
                self.require_dir(&address.parent())?;
                self.tree
                    .write()
                    .insert(Self::key(&address), Node::Dir { mtime: Utc::now() });
                Ok(VfsReply::value(true))
            }
            VfsArgs::Find { path, options } => {
                let address = VfsAddress::parse(&path)?;
                self.require_dir(&address)?;
                let limit = options.limit.filter(|limit| *limit > 0);
                let candidates: Vec<(VfsAddress, Node)> = if options.recursive {
                    let tree = self.tree.read();
                    Self::subtree(&tree, &address)
                        .into_iter()
                        .filter(|key| key.1 != address.path())
                        .filter_map(|key| {
                            let node = tree.get(&key)?.clone();
                            let found = VfsAddress::parse(&format!("{}://{}", key.0, key.1)).ok()?;
                            Some((found, node))
                        })
                        .collect()
                } else {
                    self.children(&address)
                };

                let mut found: Vec<FileInfo> = candidates
                    .iter()
                    .filter(|(entry, _)| matches_query(entry.basename(), &options.query))
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|(entry, node)| Self::info(ctx.mimes, entry, node))
                    .collect();
                if !options.recursive {
                    sort_listing(&mut found);
                }
                json_reply(&found)
            }
            VfsArgs::FileInfo { path } => {
                let address = VfsAddress::parse(&path)?;
                let node = self.lookup(&address).ok_or(VfsError::NotFound(path))?;
                json_reply(&Self::info(ctx.mimes, &address, &node))
            }
            VfsArgs::Scandir { path } => {
                let address = VfsAddress::parse(&path)?;
                self.require_dir(&address)?;
                let mut entries: Vec<FileInfo> = self
                    .children(&address)
                    .iter()
                    .map(|(entry, node)| Self::info(ctx.mimes, entry, node))
                    .collect();
                sort_listing(&mut entries);
                json_reply(&entries)
            }
            VfsArgs::FreeSpace { .. } => Ok(VfsReply::value(self.capacity.saturating_sub(self.used()))),
        }
    }

    async fn create_read_stream(&self, _ctx: &TransportContext<'_>, path: &str) -> Result<ByteStream, VfsError> {
        let address = VfsAddress::parse(path)?;
        match self.lookup(&address) {
            Some(Node::File { data, .. }) => Ok(Box::pin(futures::stream::iter([Ok::<_, io::Error>(data)]))),
            Some(Node::Dir { .. }) => Err(VfsError::MalformedRequest(format!("{} is a directory", path))),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    /// Missing parent directories are created; contents land on flush or shutdown
    async fn create_write_stream(&self, _ctx: &TransportContext<'_>, path: &str) -> Result<ByteSink, VfsError> {
        let address = VfsAddress::parse(path)?;
        {
            let mut tree = self.tree.write();
            let mut dir = address.parent();
            while !dir.is_root() {
                tree.entry(Self::key(&dir))
                    .or_insert_with(|| Node::Dir { mtime: Utc::now() });
                dir = dir.parent();
            }
        }
        self.put_file(&address, Bytes::new())?;
        Ok(Box::pin(MemoryWriter {
            tree: Arc::clone(&self.tree),
            key: Self::key(&address),
            buffer: Vec::new(),
            capacity: self.capacity,
        }))
    }
}

struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    key: (String, String),
    buffer: Vec<u8>,
    capacity: u64,
}

impl MemoryWriter {
    fn commit(&self) -> io::Result<()> {
        let mut tree = self.tree.write();
        ensure_room(&tree, &self.key, self.buffer.len() as u64, self.capacity)
            .map_err(|e| io::Error::new(io::ErrorKind::StorageFull, e.to_string()))?;
        tree.insert(
            self.key.clone(),
            Node::File {
                data: Bytes::copy_from_slice(&self.buffer),
                mtime: Utc::now(),
            },
        );
        Ok(())
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.commit())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mime::DEFAULT_MIME;
    use crate::domain::mount::{MountConfig, MountOptions, MountTable};
    use crate::domain::path_resolver::{PathResolver, ResolverEnv};
    use crate::domain::session::Session;
    use crate::domain::vfs::VfsMethod;
    use serde_json::{json, Value};
    use tokio::io::AsyncWriteExt;

    fn resolver() -> PathResolver {
        let mounts = MountTable::new().with_mount(
            "mem",
            MountConfig::Detailed(MountOptions {
                destination: None,
                transport: EXAMPLE_TRANSPORT.to_string(),
                enabled: true,
                ro: false,
                groups: vec![],
            }),
        );
        PathResolver::new(Arc::new(mounts), ResolverEnv::default())
    }

    async fn call(transport: &MemoryTransport, method: VfsMethod, args: Value) -> Result<VfsReply, VfsError> {
        let resolver = resolver();
        let session = Session::new("s");
        let mimes = MimeTable::default();
        let ctx = TransportContext {
            resolver: &resolver,
            session: &session,
            mimes: &mimes,
        };
        let request = VfsRequest::from_json(method, &args, &mut Vec::new()).unwrap();
        transport.request(&ctx, request).await
    }

    #[tokio::test]
    async fn test_tree_operations() {
        let t = MemoryTransport::new();
        call(&t, VfsMethod::Mkdir, json!({"path": "mem:///docs"})).await.unwrap();
        assert!(matches!(
            call(&t, VfsMethod::Mkdir, json!({"path": "mem:///docs"})).await,
            Err(VfsError::AlreadyExists(_))
        ));

        call(
            &t,
            VfsMethod::Write,
            json!({"path": "mem:///docs/a.txt", "data": "hello", "options": {"raw": true}}),
        )
        .await
        .unwrap();

        let reply = call(&t, VfsMethod::Read, json!({"path": "mem:///docs/a.txt"})).await.unwrap();
        assert_eq!(&reply.into_bytes().await.unwrap()[..], b"hello");

        call(&t, VfsMethod::Copy, json!({"src": "mem:///docs", "dest": "mem:///backup"}))
            .await
            .unwrap();
        call(&t, VfsMethod::Move, json!({"src": "mem:///docs", "dest": "mem:///moved"}))
            .await
            .unwrap();

        let reply = call(&t, VfsMethod::Scandir, json!({"path": "mem:///"})).await.unwrap();
        let names: Vec<String> = serde_json::from_value::<Vec<FileInfo>>(reply.into_value().unwrap())
            .unwrap()
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["backup", "moved"]);

        let reply = call(&t, VfsMethod::Exists, json!({"path": "mem:///moved/a.txt"})).await.unwrap();
        assert_eq!(reply.into_value().unwrap(), json!(true));
        assert!(matches!(
            call(&t, VfsMethod::Exists, json!({"path": "mem:///docs/a.txt"})).await,
            Err(VfsError::NotFound(_))
        ));

        call(&t, VfsMethod::Delete, json!({"path": "mem:///backup"})).await.unwrap();
        assert!(matches!(
            call(&t, VfsMethod::Delete, json!({"path": "mem:///"})).await,
            Err(VfsError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_find_and_free_space() {
        let t = MemoryTransport::with_capacity(100);
        call(&t, VfsMethod::Mkdir, json!({"path": "mem:///a"})).await.unwrap();
        for path in ["mem:///a/Notes.txt", "mem:///a/b.md", "mem:///top.txt"] {
            call(&t, VfsMethod::Write, json!({"path": path, "data": "0123456789", "options": {"raw": true}}))
                .await
                .unwrap();
        }

        let reply = call(&t, VfsMethod::Find, json!({"path": "mem:///", "args": {"query": "TXT"}})).await.unwrap();
        let found: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "mem:///top.txt");

        let reply = call(
            &t,
            VfsMethod::Find,
            json!({"path": "mem:///", "args": {"query": "txt", "recursive": true}}),
        )
        .await
        .unwrap();
        let found: Vec<FileInfo> = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(found.len(), 2);

        let reply = call(&t, VfsMethod::FreeSpace, json!({"root": "mem:///"})).await.unwrap();
        assert_eq!(reply.into_value().unwrap(), json!(70));
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let t = MemoryTransport::with_capacity(16);
        let write = |path: &'static str, data: &'static str| {
            json!({"path": path, "data": data, "options": {"raw": true}})
        };

        call(&t, VfsMethod::Write, write("mem:///a.txt", "0123456789")).await.unwrap();
        let err = call(&t, VfsMethod::Write, write("mem:///b.txt", "0123456789")).await.unwrap_err();
        assert!(matches!(err, VfsError::Upstream(_)));

        // Replacing a file only needs room for the difference
        call(&t, VfsMethod::Write, write("mem:///a.txt", "0123456789abcdef")).await.unwrap();

        let err = call(&t, VfsMethod::Copy, json!({"src": "mem:///a.txt", "dest": "mem:///c.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Upstream(_)));
        call(&t, VfsMethod::Move, json!({"src": "mem:///a.txt", "dest": "mem:///c.txt"}))
            .await
            .unwrap();

        let resolver = resolver();
        let session = Session::new("s");
        let mimes = MimeTable::default();
        let ctx = TransportContext {
            resolver: &resolver,
            session: &session,
            mimes: &mimes,
        };
        let mut sink = t.create_write_stream(&ctx, "mem:///d.txt").await.unwrap();
        sink.write_all(b"too much data").await.unwrap();
        assert!(sink.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_write_stream_creates_parents() {
        let t = MemoryTransport::new();
        let resolver = resolver();
        let session = Session::new("s");
        let mimes = MimeTable::default();
        let ctx = TransportContext {
            resolver: &resolver,
            session: &session,
            mimes: &mimes,
        };

        let mut sink = t.create_write_stream(&ctx, "mem:///x/y/z.bin").await.unwrap();
        sink.write_all(b"abc").await.unwrap();
        sink.shutdown().await.unwrap();

        let reply = call(&t, VfsMethod::FileInfo, json!({"path": "mem:///x/y/z.bin"})).await.unwrap();
        let info: FileInfo = serde_json::from_value(reply.into_value().unwrap()).unwrap();
        assert_eq!(info.size, 3);
        assert_eq!(info.mime.as_deref(), Some(DEFAULT_MIME));
        assert_eq!(
            call(&t, VfsMethod::Scandir, json!({"path": "mem:///x"})).await.unwrap().into_value().unwrap()[0]["type"],
            "dir"
        );
    }
}
