// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Static assets served from `http.dist`

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::Response;
use std::path::{Path, PathBuf};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::domain::mime::{MimeTable, DEFAULT_MIME};
use crate::domain::path_sanitizer::PathSanitizer;
use crate::domain::vfs::VfsError;
use crate::presentation::response::set_content_type;

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    mimes: MimeTable,
    sanitizer: PathSanitizer,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, mimes: MimeTable) -> Self {
        Self {
            root: root.into(),
            mimes,
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Locate a dist-relative asset; directories resolve to their index
    pub async fn locate(&self, relative: &str) -> Result<PathBuf, VfsError> {
        let normalized = self
            .sanitizer
            .normalize(relative)
            .map_err(|_| VfsError::NotFound(relative.to_string()))?;
        let mut path = self
            .sanitizer
            .contain(&self.root, &normalized)
            .map_err(|_| VfsError::NotFound(relative.to_string()))?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| VfsError::from_io(e, relative))?;
        if metadata.is_dir() {
            path.push(INDEX_FILE);
        }
        Ok(path)
    }

    pub async fn serve(&self, relative: &str) -> Result<Response, VfsError> {
        let path = self.locate(relative).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| VfsError::from_io(e, relative))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| VfsError::from_io(e, relative))?
            .len();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = self
            .mimes
            .by_name(&name)
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        debug!(asset = %relative, mime = %mime, "Serving static asset");

        let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
        set_content_type(&mut response, &mime);
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        Ok(response)
    }
}
