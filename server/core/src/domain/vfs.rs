// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! VFS operation vocabulary
//!
//! The fixed set of filesystem operations, their typed arguments, the
//! replies a transport may produce and the error taxonomy shared by every
//! layer that touches the virtual filesystem.

use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

use crate::domain::path_sanitizer::PathSanitizerError;

/// Byte stream produced by a transport read
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Byte sink returned by a transport write stream
pub type ByteSink = Pin<Box<dyn tokio::io::AsyncWrite + Send>>;

/// Supported VFS operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsMethod {
    Exists,
    Read,
    Write,
    Upload,
    Delete,
    Copy,
    Move,
    Mkdir,
    Find,
    FileInfo,
    Scandir,
    FreeSpace,
}

impl VfsMethod {
    pub const ALL: [VfsMethod; 12] = [
        VfsMethod::Exists,
        VfsMethod::Read,
        VfsMethod::Write,
        VfsMethod::Upload,
        VfsMethod::Delete,
        VfsMethod::Copy,
        VfsMethod::Move,
        VfsMethod::Mkdir,
        VfsMethod::Find,
        VfsMethod::FileInfo,
        VfsMethod::Scandir,
        VfsMethod::FreeSpace,
    ];

    /// Parse the wire name used in `/FS/<method>` endpoints
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VfsMethod::Exists => "exists",
            VfsMethod::Read => "read",
            VfsMethod::Write => "write",
            VfsMethod::Upload => "upload",
            VfsMethod::Delete => "delete",
            VfsMethod::Copy => "copy",
            VfsMethod::Move => "move",
            VfsMethod::Mkdir => "mkdir",
            VfsMethod::Find => "find",
            VfsMethod::FileInfo => "fileinfo",
            VfsMethod::Scandir => "scandir",
            VfsMethod::FreeSpace => "freeSpace",
        }
    }

    /// Operations refused on read-only mounts
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            VfsMethod::Upload
                | VfsMethod::Write
                | VfsMethod::Delete
                | VfsMethod::Copy
                | VfsMethod::Move
                | VfsMethod::Mkdir
        )
    }

    /// Operations that may be issued with a plain GET and query arguments
    pub fn allows_get(&self) -> bool {
        matches!(
            self,
            VfsMethod::Exists
                | VfsMethod::Read
                | VfsMethod::FileInfo
                | VfsMethod::Scandir
                | VfsMethod::Find
                | VfsMethod::FreeSpace
        )
    }
}

impl fmt::Display for VfsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Return bytes (stream or buffer) instead of a data URL
    pub raw: bool,
    /// Stream the file instead of buffering it
    pub stream: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            raw: true,
            stream: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawType {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    /// One byte per char (latin-1)
    Binary,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub raw: bool,
    pub rawtype: RawType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    pub query: String,
    pub recursive: bool,
    pub limit: Option<usize>,
}

/// Data carried by a `write`
#[derive(Debug, Clone, PartialEq)]
pub enum WritePayload {
    /// Text from a JSON body, decoded according to [`WriteOptions`]
    Text(String),
    /// Bytes handed over by an internal caller
    Bytes(Bytes),
}

/// A multipart upload buffered to a temporary file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub temp_path: PathBuf,
    pub size: u64,
    pub mime: Option<String>,
}

/// Typed arguments, one variant per [`VfsMethod`]
#[derive(Debug, Clone, PartialEq)]
pub enum VfsArgs {
    Exists { path: String },
    Read { path: String, options: ReadOptions },
    Write { path: String, data: WritePayload, options: WriteOptions },
    Upload { path: String, overwrite: bool, file: UploadedFile },
    Delete { path: String },
    Copy { src: String, dest: String },
    Move { src: String, dest: String },
    Mkdir { path: String },
    Find { path: String, options: FindOptions },
    FileInfo { path: String },
    Scandir { path: String },
    FreeSpace { root: String },
}

/// Normalized `{query, method, data}` envelope forwarded to a transport
#[derive(Debug, Clone, PartialEq)]
pub struct VfsRequest {
    pub args: VfsArgs,
}

impl VfsRequest {
    pub fn new(args: VfsArgs) -> Self {
        Self { args }
    }

    pub fn method(&self) -> VfsMethod {
        match &self.args {
            VfsArgs::Exists { .. } => VfsMethod::Exists,
            VfsArgs::Read { .. } => VfsMethod::Read,
            VfsArgs::Write { .. } => VfsMethod::Write,
            VfsArgs::Upload { .. } => VfsMethod::Upload,
            VfsArgs::Delete { .. } => VfsMethod::Delete,
            VfsArgs::Copy { .. } => VfsMethod::Copy,
            VfsArgs::Move { .. } => VfsMethod::Move,
            VfsArgs::Mkdir { .. } => VfsMethod::Mkdir,
            VfsArgs::Find { .. } => VfsMethod::Find,
            VfsArgs::FileInfo { .. } => VfsMethod::FileInfo,
            VfsArgs::Scandir { .. } => VfsMethod::Scandir,
            VfsArgs::FreeSpace { .. } => VfsMethod::FreeSpace,
        }
    }

    /// Address fields relevant for mount selection, in order.
    ///
    /// `copy`/`move` yield `[src, dest]`, `freeSpace` its `root`, everything
    /// else its `path`.
    pub fn addresses(&self) -> Vec<&str> {
        match &self.args {
            VfsArgs::Copy { src, dest } | VfsArgs::Move { src, dest } => {
                vec![src.as_str(), dest.as_str()]
            }
            VfsArgs::FreeSpace { root } => vec![root.as_str()],
            VfsArgs::Exists { path }
            | VfsArgs::Read { path, .. }
            | VfsArgs::Write { path, .. }
            | VfsArgs::Upload { path, .. }
            | VfsArgs::Delete { path }
            | VfsArgs::Mkdir { path }
            | VfsArgs::Find { path, .. }
            | VfsArgs::FileInfo { path }
            | VfsArgs::Scandir { path } => vec![path.as_str()],
        }
    }

    /// Build a request from JSON arguments as received over HTTP or WebSocket.
    ///
    /// `uploads` holds files buffered from a multipart body; `upload` takes
    /// the first of them.
    pub fn from_json(
        method: VfsMethod,
        args: &Value,
        uploads: &mut Vec<UploadedFile>,
    ) -> Result<Self, VfsError> {
        let args = match method {
            VfsMethod::Exists => VfsArgs::Exists { path: field_str(args, "path")? },
            VfsMethod::Read => VfsArgs::Read {
                path: field_str(args, "path")?,
                options: field_options(args, "options")?,
            },
            VfsMethod::Write => {
                let data = match args.get("data") {
                    Some(Value::String(s)) => WritePayload::Text(s.clone()),
                    Some(Value::Null) | None => WritePayload::Text(String::new()),
                    Some(other) => WritePayload::Text(other.to_string()),
                };
                VfsArgs::Write {
                    path: field_str(args, "path")?,
                    data,
                    options: field_options(args, "options")?,
                }
            }
            VfsMethod::Upload => {
                if uploads.is_empty() {
                    return Err(VfsError::MalformedRequest("No file was uploaded".to_string()));
                }
                VfsArgs::Upload {
                    path: field_str(args, "path")?,
                    overwrite: field_bool(args, "overwrite"),
                    file: uploads.remove(0),
                }
            }
            VfsMethod::Delete => VfsArgs::Delete { path: field_str(args, "path")? },
            VfsMethod::Copy => VfsArgs::Copy {
                src: field_str(args, "src")?,
                dest: field_str(args, "dest")?,
            },
            VfsMethod::Move => VfsArgs::Move {
                src: field_str(args, "src")?,
                dest: field_str(args, "dest")?,
            },
            VfsMethod::Mkdir => VfsArgs::Mkdir { path: field_str(args, "path")? },
            VfsMethod::Find => VfsArgs::Find {
                path: field_str(args, "path")?,
                options: field_options(args, "args")?,
            },
            VfsMethod::FileInfo => VfsArgs::FileInfo { path: field_str(args, "path")? },
            VfsMethod::Scandir => VfsArgs::Scandir { path: field_str(args, "path")? },
            VfsMethod::FreeSpace => VfsArgs::FreeSpace { root: field_str(args, "root")? },
        };

        Ok(Self { args })
    }
}

fn field_str(args: &Value, name: &str) -> Result<String, VfsError> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VfsError::MalformedRequest(format!("Missing argument: {}", name)))
}

/// Multipart fields arrive as strings, JSON bodies as booleans
fn field_bool(args: &Value, name: &str) -> bool {
    match args.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes" | "on"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn field_options<T: DeserializeOwned + Default>(args: &Value, name: &str) -> Result<T, VfsError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| VfsError::MalformedRequest(format!("Invalid {}: {}", name, e))),
    }
}

/// Result of a transport call
pub enum VfsReply {
    /// JSON-serializable result (wrapped in the `{error, result}` envelope)
    Value(Value),
    /// Whole file buffered in memory
    Bytes { data: Bytes, mime: String },
    /// File piped straight to the client
    Stream {
        stream: ByteStream,
        mime: String,
        size: Option<u64>,
        filename: String,
    },
}

impl VfsReply {
    pub fn value(value: impl Into<Value>) -> Self {
        VfsReply::Value(value.into())
    }

    /// Unwrap a JSON result; byte replies are refused
    pub fn into_value(self) -> Result<Value, VfsError> {
        match self {
            VfsReply::Value(v) => Ok(v),
            VfsReply::Bytes { .. } | VfsReply::Stream { .. } => Err(VfsError::NotAvailable),
        }
    }

    /// Collect the file contents of a byte reply
    pub async fn into_bytes(self) -> Result<Bytes, VfsError> {
        use futures::TryStreamExt;

        match self {
            VfsReply::Bytes { data, .. } => Ok(data),
            VfsReply::Stream { stream, .. } => {
                let chunks: Vec<Bytes> = stream
                    .try_collect()
                    .await
                    .map_err(|e| VfsError::Io(e.to_string()))?;
                Ok(chunks.concat().into())
            }
            VfsReply::Value(Value::String(s)) => Ok(Bytes::from(s)),
            VfsReply::Value(_) => Err(VfsError::NotAvailable),
        }
    }
}

impl fmt::Debug for VfsReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsReply::Value(v) => f.debug_tuple("Value").field(v).finish(),
            VfsReply::Bytes { data, mime } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("mime", mime)
                .finish(),
            VfsReply::Stream { mime, size, filename, .. } => f
                .debug_struct("Stream")
                .field("mime", mime)
                .field("size", size)
                .field("filename", filename)
                .finish(),
        }
    }
}

/// VFS errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VfsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File or directory already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation denied")]
    OperationDenied,

    #[error("Cannot find VFS module: {0}")]
    TransportNotFound(String),

    #[error("Invalid VFS address: {0}")]
    InvalidAddress(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Not available")]
    NotAvailable,

    #[error("Unavailable: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl VfsError {
    /// Convert an IO failure on `target` into the matching taxonomy entry
    pub fn from_io(err: std::io::Error, target: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound(target.to_string()),
            std::io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(target.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                VfsError::PermissionDenied(format!("{}: {}", target, err))
            }
            _ => VfsError::Io(format!("{}: {}", target, err)),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            VfsError::PermissionDenied(_) | VfsError::OperationDenied => 403,
            VfsError::NotFound(_) => 404,
            VfsError::InvalidAddress(_) | VfsError::MalformedRequest(_) => 400,
            _ => 500,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        VfsError::Io(err.to_string())
    }
}

impl From<PathSanitizerError> for VfsError {
    fn from(err: PathSanitizerError) -> Self {
        match err {
            PathSanitizerError::PathTraversal(_) | PathSanitizerError::OutsideBoundary(_) => {
                VfsError::PermissionDenied(err.to_string())
            }
            PathSanitizerError::InvalidPath(_) | PathSanitizerError::PathTooLong(_) => {
                VfsError::MalformedRequest(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names_roundtrip() {
        for method in VfsMethod::ALL {
            assert_eq!(VfsMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(VfsMethod::parse("freeSpace"), Some(VfsMethod::FreeSpace));
        assert_eq!(VfsMethod::parse("format"), None);
    }

    #[test]
    fn test_write_methods() {
        let writes: Vec<_> = VfsMethod::ALL.into_iter().filter(|m| m.is_write()).collect();
        assert_eq!(
            writes,
            vec![
                VfsMethod::Write,
                VfsMethod::Upload,
                VfsMethod::Delete,
                VfsMethod::Copy,
                VfsMethod::Move,
                VfsMethod::Mkdir
            ]
        );
    }

    #[test]
    fn test_address_extraction() {
        let mut uploads = Vec::new();
        let copy = VfsRequest::from_json(
            VfsMethod::Copy,
            &json!({"src": "home:///a", "dest": "tmp:///b"}),
            &mut uploads,
        )
        .unwrap();
        assert_eq!(copy.addresses(), vec!["home:///a", "tmp:///b"]);

        let space =
            VfsRequest::from_json(VfsMethod::FreeSpace, &json!({"root": "home:///"}), &mut uploads)
                .unwrap();
        assert_eq!(space.addresses(), vec!["home:///"]);
    }

    #[test]
    fn test_read_defaults() {
        let mut uploads = Vec::new();
        let req = VfsRequest::from_json(VfsMethod::Read, &json!({"path": "home:///a"}), &mut uploads)
            .unwrap();
        assert_eq!(
            req.args,
            VfsArgs::Read {
                path: "home:///a".to_string(),
                options: ReadOptions { raw: true, stream: true }
            }
        );
    }

    #[test]
    fn test_find_options() {
        let mut uploads = Vec::new();
        let req = VfsRequest::from_json(
            VfsMethod::Find,
            &json!({"path": "home:///", "args": {"query": "txt", "recursive": true, "limit": 5}}),
            &mut uploads,
        )
        .unwrap();
        match req.args {
            VfsArgs::Find { options, .. } => {
                assert_eq!(options.query, "txt");
                assert!(options.recursive);
                assert_eq!(options.limit, Some(5));
            }
            other => panic!("unexpected args: {:?}", other),
        }
    }

    #[test]
    fn test_missing_argument() {
        let mut uploads = Vec::new();
        let err = VfsRequest::from_json(VfsMethod::Mkdir, &json!({}), &mut uploads).unwrap_err();
        assert!(matches!(err, VfsError::MalformedRequest(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_upload_takes_buffered_file() {
        let mut uploads = vec![UploadedFile {
            filename: "a.txt".to_string(),
            temp_path: PathBuf::from("/tmp/upload-1"),
            size: 3,
            mime: None,
        }];
        let req = VfsRequest::from_json(
            VfsMethod::Upload,
            &json!({"path": "home:///", "overwrite": "true"}),
            &mut uploads,
        )
        .unwrap();
        assert!(uploads.is_empty());
        assert!(matches!(req.args, VfsArgs::Upload { overwrite: true, .. }));

        let err = VfsRequest::from_json(VfsMethod::Upload, &json!({"path": "home:///"}), &mut uploads)
            .unwrap_err();
        assert!(matches!(err, VfsError::MalformedRequest(_)));
    }

    #[test]
    fn test_io_error_mapping() {
        let err = VfsError::from_io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "home:///a",
        );
        assert_eq!(err, VfsError::NotFound("home:///a".to_string()));
        assert_eq!(err.status_code(), 404);
        assert_eq!(VfsError::OperationDenied.to_string(), "Operation denied");
        assert_eq!(VfsError::OperationDenied.status_code(), 403);
    }
}
