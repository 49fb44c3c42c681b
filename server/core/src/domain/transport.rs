// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transport trait
//!
//! A transport implements the VFS operation set against one kind of
//! storage. Transports are registered by name at startup and selected per
//! call from the owning mount's `transport` field.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::Serialize;

use crate::domain::address::VfsAddress;
use crate::domain::mime::MimeTable;
use crate::domain::path_resolver::PathResolver;
use crate::domain::session::Session;
use crate::domain::vfs::{
    ByteSink, ByteStream, RawType, VfsError, VfsReply, VfsRequest, WriteOptions, WritePayload,
};

/// Per-call collaborators handed to a transport
#[derive(Clone, Copy)]
pub struct TransportContext<'a> {
    pub resolver: &'a PathResolver,
    pub session: &'a Session,
    pub mimes: &'a MimeTable,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry key referenced by mount `transport` fields
    fn name(&self) -> &str;

    /// Perform one VFS operation. Exactly one outcome is produced per call.
    async fn request(
        &self,
        ctx: &TransportContext<'_>,
        request: VfsRequest,
    ) -> Result<VfsReply, VfsError>;

    async fn create_read_stream(
        &self,
        ctx: &TransportContext<'_>,
        path: &str,
    ) -> Result<ByteStream, VfsError>;

    /// Open `path` for writing, truncating any existing file
    async fn create_write_stream(
        &self,
        ctx: &TransportContext<'_>,
        path: &str,
    ) -> Result<ByteSink, VfsError>;
}

/// `data:<mime>;base64,<payload>`
pub fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Decode the bytes a `write` should persist
pub fn decode_payload(payload: WritePayload, options: &WriteOptions) -> Result<Bytes, VfsError> {
    let text = match payload {
        WritePayload::Bytes(bytes) => return Ok(bytes),
        WritePayload::Text(text) => text,
    };

    if options.raw {
        return match options.rawtype {
            RawType::Utf8 => Ok(Bytes::from(text)),
            RawType::Binary => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)))
                .collect::<Result<Vec<u8>, _>>()
                .map(Bytes::from)
                .map_err(|_| {
                    VfsError::MalformedRequest("binary data contains characters above U+00FF".to_string())
                }),
            RawType::Base64 => STANDARD
                .decode(text.trim())
                .map(Bytes::from)
                .map_err(|e| VfsError::MalformedRequest(format!("Invalid base64 data: {}", e))),
        };
    }

    // Data URL: everything after the first comma is base64
    let encoded = match text.find(',') {
        Some(idx) => &text[idx + 1..],
        None => text.as_str(),
    };
    STANDARD
        .decode(encoded.trim())
        .map(Bytes::from)
        .map_err(|e| VfsError::MalformedRequest(format!("Invalid data URL: {}", e)))
}

/// `delete` never touches a mount root (`""`, `.` and `/` all normalize to it)
pub fn ensure_deletable(address: &VfsAddress) -> Result<(), VfsError> {
    if address.is_root() {
        return Err(VfsError::PermissionDenied(format!(
            "refusing to delete {}",
            address
        )));
    }
    Ok(())
}

/// Final path segment of a client-supplied upload name
pub fn upload_name(filename: &str) -> Result<String, VfsError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(VfsError::MalformedRequest(format!("Invalid upload filename: {:?}", filename)));
    }
    Ok(name.to_string())
}

pub fn json_reply<T: Serialize>(value: &T) -> Result<VfsReply, VfsError> {
    serde_json::to_value(value)
        .map(VfsReply::Value)
        .map_err(|e| VfsError::Io(format!("serialize reply: {}", e)))
}

/// Case-insensitive substring match used by `find`
pub fn matches_query(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}
