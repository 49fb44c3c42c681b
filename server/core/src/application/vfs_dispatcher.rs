// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! VFS Dispatcher
//!
//! Selects the transport owning each address of a request, enforces the
//! mount `enabled`/`ro` flags and forwards the call. When `copy`/`move`
//! span two transports the bytes are piped from the source read stream into
//! the destination write stream.

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::address::VfsAddress;
use crate::domain::file_info::FileInfo;
use crate::domain::mime::MimeTable;
use crate::domain::mount::Mountpoint;
use crate::domain::path_resolver::PathResolver;
use crate::domain::session::Session;
use crate::domain::transport::{Transport, TransportContext};
use crate::domain::vfs::{
    ByteSink, ByteStream, ReadOptions, VfsArgs, VfsError, VfsMethod, VfsReply, VfsRequest,
};

/// Transports keyed by name, filled once at startup
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport; a later registration under the same name wins
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        let name = transport.name().to_string();
        if self.transports.insert(name.clone(), transport).is_some() {
            warn!(transport = %name, "Replacing already registered transport");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub struct VfsDispatcher {
    resolver: PathResolver,
    registry: TransportRegistry,
    mimes: MimeTable,
}

impl VfsDispatcher {
    pub fn new(resolver: PathResolver, registry: TransportRegistry, mimes: MimeTable) -> Self {
        Self {
            resolver,
            registry,
            mimes,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn mimes(&self) -> &MimeTable {
        &self.mimes
    }

    fn context<'a>(&'a self, session: &'a Session) -> TransportContext<'a> {
        TransportContext {
            resolver: &self.resolver,
            session,
            mimes: &self.mimes,
        }
    }

    /// Owning mount and registered transport of one address
    fn locate(&self, query: &str) -> Result<(&Mountpoint, Arc<dyn Transport>), VfsError> {
        let (mount, _) = self.resolver.mount_for(query)?;
        let transport = self
            .registry
            .get(&mount.transport)
            .ok_or_else(|| VfsError::TransportNotFound(mount.transport.clone()))?;
        Ok((mount, transport))
    }

    /// Mounts a request touches, after the `enabled`/`ro` checks.
    ///
    /// `copy` only needs its source readable, so the source mount is checked
    /// as a read; `move` removes the source and is a write on both sides.
    pub fn mounts_for(&self, request: &VfsRequest) -> Result<Vec<Mountpoint>, VfsError> {
        let method = request.method();
        let addresses = request.addresses();
        let mut mounts = Vec::with_capacity(addresses.len());

        for (idx, query) in addresses.into_iter().enumerate() {
            let (mount, _) = self.locate(query)?;
            let effective = match method {
                VfsMethod::Copy if idx == 0 => VfsMethod::Read,
                other => other,
            };
            mount.allows(effective)?;
            mounts.push(mount.clone());
        }

        Ok(mounts)
    }

    /// Run one VFS operation for `session`
    pub async fn request(&self, session: &Session, request: VfsRequest) -> Result<VfsReply, VfsError> {
        let method = request.method();
        let mounts = self.mounts_for(&request)?;

        // mounts_for succeeded, so every address has a registered transport
        let transports: Vec<Arc<dyn Transport>> = request
            .addresses()
            .into_iter()
            .map(|query| self.locate(query).map(|(_, t)| t))
            .collect::<Result<_, _>>()?;
        let transport = Arc::clone(&transports[0]);
        let transport_name = transport.name().to_string();

        debug!(
            method = %method,
            protocol = %mounts[0].protocol,
            transport = %transport_name,
            "Dispatching VFS request"
        );
        metrics::counter!(
            "cloudesk_vfs_requests_total",
            "method" => method.as_str(),
            "transport" => transport_name.clone()
        )
        .increment(1);

        let ctx = self.context(session);
        let cross_transport = transports.len() == 2 && transports[0].name() != transports[1].name();

        let result = match request.args {
            VfsArgs::Copy { src, dest } if cross_transport => {
                self.transfer_across(&ctx, &transports[0], &transports[1], &src, &dest, false)
                    .await
            }
            VfsArgs::Move { src, dest } if cross_transport => {
                self.transfer_across(&ctx, &transports[0], &transports[1], &src, &dest, true)
                    .await
            }
            args => transport.request(&ctx, VfsRequest::new(args)).await,
        };

        if let Err(e) = &result {
            debug!(method = %method, transport = %transport_name, error = %e, "VFS request failed");
            metrics::counter!("cloudesk_vfs_errors_total", "method" => method.as_str()).increment(1);
        }
        result
    }

    pub async fn create_read_stream(&self, session: &Session, path: &str) -> Result<ByteStream, VfsError> {
        let (mount, transport) = self.locate(path)?;
        mount.allows(VfsMethod::Read)?;
        transport.create_read_stream(&self.context(session), path).await
    }

    pub async fn create_write_stream(&self, session: &Session, path: &str) -> Result<ByteSink, VfsError> {
        let (mount, transport) = self.locate(path)?;
        mount.allows(VfsMethod::Write)?;
        transport.create_write_stream(&self.context(session), path).await
    }

    /// Call from server components that have no HTTP context, as the
    /// system session
    pub async fn internal(&self, request: VfsRequest) -> Result<VfsReply, VfsError> {
        self.request(&Session::system(), request).await
    }

    /// Buffer a whole file
    pub async fn read_bytes(&self, session: &Session, path: &str) -> Result<bytes::Bytes, VfsError> {
        let request = VfsRequest::new(VfsArgs::Read {
            path: path.to_string(),
            options: ReadOptions { raw: true, stream: false },
        });
        self.request(session, request).await?.into_bytes().await
    }

    async fn transfer_across(
        &self,
        ctx: &TransportContext<'_>,
        from: &Arc<dyn Transport>,
        to: &Arc<dyn Transport>,
        src: &str,
        dest: &str,
        remove_src: bool,
    ) -> Result<VfsReply, VfsError> {
        let src_address = VfsAddress::parse(src)?;
        let dest_address = VfsAddress::parse(dest)?;

        match to
            .request(ctx, VfsRequest::new(VfsArgs::Exists { path: dest.to_string() }))
            .await
        {
            Ok(_) => return Err(VfsError::AlreadyExists(dest.to_string())),
            Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        debug!(src = %src_address, dest = %dest_address, "Copying across transports");
        copy_entry(ctx, from, to, src_address, dest_address).await?;

        if remove_src {
            from.request(ctx, VfsRequest::new(VfsArgs::Delete { path: src.to_string() }))
                .await?;
        }
        Ok(VfsReply::value(true))
    }
}

fn stat<'a>(
    ctx: &'a TransportContext<'a>,
    transport: &'a Arc<dyn Transport>,
    args: VfsArgs,
) -> BoxFuture<'a, Result<serde_json::Value, VfsError>> {
    async move { transport.request(ctx, VfsRequest::new(args)).await?.into_value() }.boxed()
}

/// Copy one file or a whole directory tree between transports
fn copy_entry<'a>(
    ctx: &'a TransportContext<'a>,
    from: &'a Arc<dyn Transport>,
    to: &'a Arc<dyn Transport>,
    src: VfsAddress,
    dest: VfsAddress,
) -> BoxFuture<'a, Result<(), VfsError>> {
    async move {
        let info: FileInfo = serde_json::from_value(
            stat(ctx, from, VfsArgs::FileInfo { path: src.to_string() }).await?,
        )
        .map_err(|e| VfsError::Io(format!("fileinfo {}: {}", src, e)))?;

        if info.is_dir() {
            to.request(ctx, VfsRequest::new(VfsArgs::Mkdir { path: dest.to_string() }))
                .await?;
            let listing: Vec<FileInfo> = serde_json::from_value(
                stat(ctx, from, VfsArgs::Scandir { path: src.to_string() }).await?,
            )
            .map_err(|e| VfsError::Io(format!("scandir {}: {}", src, e)))?;
            for entry in listing {
                copy_entry(ctx, from, to, src.join(&entry.filename), dest.join(&entry.filename)).await?;
            }
            return Ok(());
        }

        let mut stream = from.create_read_stream(ctx, &src.to_string()).await?;
        let mut sink = to.create_write_stream(ctx, &dest.to_string()).await?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| VfsError::from_io(e, &src.to_string()))?;
            sink.write_all(&chunk)
                .await
                .map_err(|e| VfsError::from_io(e, &dest.to_string()))?;
        }
        sink.shutdown()
            .await
            .map_err(|e| VfsError::from_io(e, &dest.to_string()))?;
        Ok(())
    }
    .boxed()
}
