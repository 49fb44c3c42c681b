// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request Pipeline
//!
//! Transport-neutral handling shared by the HTTP and WebSocket front ends:
//! session check, permission check, then dispatch to the VFS, the API
//! method table or the package asset gate.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::endpoint::ApiMethod;
use crate::application::package_manager::PackageManager;
use crate::application::vfs_dispatcher::VfsDispatcher;
use crate::domain::auth::{AuthError, Authenticator, LoginRequest, PermissionRequest};
use crate::domain::package::{PackageError, PackageScope};
use crate::domain::session::{Session, SessionStore};
use crate::domain::settings::{SettingsError, SettingsStore};
use crate::domain::vfs::{UploadedFile, VfsError, VfsMethod, VfsReply, VfsRequest};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Invalid method: {0}")]
    UnknownMethod(String),

    #[error("Malformed request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Vfs(e) => e.status_code(),
            ApiError::Auth(e) => e.status_code(),
            ApiError::Package(e) => e.status_code(),
            ApiError::Settings(SettingsError::InvalidSettings) => 400,
            ApiError::Settings(_) => 500,
            ApiError::UnknownMethod(_) | ApiError::BadRequest(_) => 400,
        }
    }
}

pub struct RequestPipeline {
    vfs: Arc<VfsDispatcher>,
    auth: Arc<dyn Authenticator>,
    sessions: Arc<dyn SessionStore>,
    settings: Arc<dyn SettingsStore>,
    packages: Arc<PackageManager>,
}

impl RequestPipeline {
    pub fn new(
        vfs: Arc<VfsDispatcher>,
        auth: Arc<dyn Authenticator>,
        sessions: Arc<dyn SessionStore>,
        settings: Arc<dyn SettingsStore>,
        packages: Arc<PackageManager>,
    ) -> Self {
        Self {
            vfs,
            auth,
            sessions,
            settings,
            packages,
        }
    }

    pub fn vfs(&self) -> &Arc<VfsDispatcher> {
        &self.vfs
    }

    pub fn auth(&self) -> &Arc<dyn Authenticator> {
        &self.auth
    }

    pub fn packages(&self) -> &Arc<PackageManager> {
        &self.packages
    }

    /// Load (or start) the session for `sid` and run the authenticator hook
    pub async fn open_session(&self, sid: Option<&str>) -> Session {
        let mut session = self.sessions.load(sid).await;
        if let Err(e) = self.auth.init_session(&mut session).await {
            warn!(sid = %session.id, error = %e, "Authenticator failed to initialize session");
        }
        session
    }

    /// Persist the session after a request; logged out sessions are gone
    pub async fn close_session(&self, session: &Session) {
        self.sessions.save(session).await;
    }

    /// Run a VFS operation. Upload temp files are removed afterwards in
    /// every outcome.
    pub async fn vfs_call(
        &self,
        session: &Session,
        method: VfsMethod,
        args: &Value,
        uploads: Vec<UploadedFile>,
    ) -> Result<VfsReply, ApiError> {
        let temp_paths: Vec<PathBuf> = uploads.iter().map(|u| u.temp_path.clone()).collect();
        let result = self.vfs_gated(session, method, args, uploads).await;
        remove_temp_files(&temp_paths).await;
        result
    }

    async fn vfs_gated(
        &self,
        session: &Session,
        method: VfsMethod,
        args: &Value,
        mut uploads: Vec<UploadedFile>,
    ) -> Result<VfsReply, ApiError> {
        self.auth.check_session(session).await?;
        let request = VfsRequest::from_json(method, args, &mut uploads)?;
        let mounts = self.vfs.mounts_for(&request)?;
        self.auth
            .check_permission(session, &PermissionRequest::Vfs { method, mounts })
            .await?;
        Ok(self.vfs.request(session, request).await?)
    }

    pub async fn api_call(
        &self,
        session: &mut Session,
        method: ApiMethod,
        args: &Value,
    ) -> Result<Value, ApiError> {
        metrics::counter!("cloudesk_api_requests_total", "method" => method.as_str()).increment(1);

        if method.requires_session() {
            self.auth.check_session(session).await?;
        }
        self.auth
            .check_permission(session, &PermissionRequest::Api { method: method.as_str() })
            .await?;

        debug!(method = %method, sid = %session.id, "Dispatching API call");
        match method {
            ApiMethod::Login => self.login(session, args).await,
            ApiMethod::Logout => {
                self.auth.logout(session).await?;
                self.sessions.destroy(&session.id).await;
                Ok(Value::Bool(true))
            }
            ApiMethod::Packages => self.packages_command(session, args).await,
            ApiMethod::Settings => self.settings_command(session, args).await,
            ApiMethod::Users => {
                let command = args.get("command").and_then(Value::as_str).unwrap_or("list");
                let command_args = args.get("args").unwrap_or(&Value::Null);
                Ok(self.auth.manage(session, command, command_args).await?)
            }
        }
    }

    /// Gate a `/packages/...` asset: valid session plus `package`
    /// permission for the owning system package
    pub async fn package_asset(&self, session: &Session, asset: &str) -> Result<(), ApiError> {
        self.auth.check_session(session).await?;
        let relative = asset.strip_prefix("packages/").unwrap_or(asset);
        if let Some((id, metadata)) = self.packages.system_owner(relative).await? {
            self.auth
                .check_permission(session, &PermissionRequest::Package { id: &id, metadata: &metadata })
                .await?;
        }
        Ok(())
    }

    async fn login(&self, session: &mut Session, args: &Value) -> Result<Value, ApiError> {
        let request: LoginRequest =
            serde_json::from_value(args.clone()).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let user = self.auth.login(session, &request).await?;
        self.sessions.save(session).await;
        info!(username = %user.username, sid = %session.id, "User logged in");

        let settings = self.settings.get(&user.username).await?;
        Ok(json!({ "userData": user, "userSettings": settings }))
    }

    async fn settings_command(&self, session: &Session, args: &Value) -> Result<Value, ApiError> {
        let username = session.username().ok_or(AuthError::NoSession)?;
        match args.get("settings") {
            Some(settings) => {
                self.settings.set(username, settings.clone()).await?;
                Ok(Value::Bool(true))
            }
            None => Ok(self.settings.get(username).await?),
        }
    }

    async fn packages_command(&self, session: &Session, args: &Value) -> Result<Value, ApiError> {
        let command = str_field(args, "command")?;
        let command_args = match args.get("args") {
            Some(inner) if inner.is_object() => inner,
            _ => args,
        };
        let paths = paths_field(command_args)?;

        let search_paths: Vec<&str> = paths
            .as_deref()
            .unwrap_or(self.packages.user_paths())
            .iter()
            .map(String::as_str)
            .collect();

        match command.as_str() {
            "install" => {
                let zip = str_field(command_args, "zip")?;
                let dest = str_field(command_args, "dest")?;
                let mut targets = vec![(VfsMethod::Read, zip.as_str()), (VfsMethod::Mkdir, dest.as_str())];
                for path in paths.as_deref().unwrap_or(&[]) {
                    targets.push((VfsMethod::Write, path.as_str()));
                }
                self.gate_addresses(session, &targets).await?;

                self.packages
                    .install(session, &zip, &dest, paths.as_deref().unwrap_or(&[]))
                    .await?;
                Ok(Value::Bool(true))
            }
            "uninstall" => {
                let path = str_field(command_args, "path")?;
                self.gate_addresses(session, &[(VfsMethod::Delete, path.as_str())])
                    .await?;
                self.packages.uninstall(session, &path).await?;
                Ok(Value::Bool(true))
            }
            "list" => {
                let scope = scope_field(command_args)?;
                if scope != Some(PackageScope::System) {
                    let targets: Vec<_> = search_paths.iter().map(|p| (VfsMethod::Read, *p)).collect();
                    self.gate_addresses(session, &targets).await?;
                }
                let manifest = self.packages.list(session, scope, paths.as_deref()).await?;
                serde_json::to_value(manifest).map_err(|e| ApiError::BadRequest(e.to_string()))
            }
            "cache" => {
                let action = str_field(command_args, "action")?;
                let scope = scope_field(command_args)?;
                let targets: Vec<_> = search_paths.iter().map(|p| (VfsMethod::Write, *p)).collect();
                self.gate_addresses(session, &targets).await?;
                self.packages
                    .cache(session, &action, scope, paths.as_deref())
                    .await?;
                Ok(Value::Bool(true))
            }
            other => Err(ApiError::UnknownMethod(format!("packages/{}", other))),
        }
    }

    /// Same mount and group checks an `/FS` call on each address would get
    async fn gate_addresses(&self, session: &Session, targets: &[(VfsMethod, &str)]) -> Result<(), ApiError> {
        for (method, address) in targets {
            let (mount, _) = self.vfs.resolver().mount_for(address)?;
            mount.allows(*method)?;
            self.auth
                .check_permission(
                    session,
                    &PermissionRequest::Vfs {
                        method: *method,
                        mounts: vec![mount.clone()],
                    },
                )
                .await?;
        }
        Ok(())
    }
}

async fn remove_temp_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(temp = %path.display(), "Removed leftover upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(temp = %path.display(), error = %e, "Failed to remove upload temp file"),
        }
    }
}

fn str_field(args: &Value, name: &str) -> Result<String, ApiError> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing argument: {}", name)))
}

fn paths_field(args: &Value) -> Result<Option<Vec<String>>, ApiError> {
    match args.get("paths") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("Invalid paths: {}", e))),
    }
}

fn scope_field(args: &Value) -> Result<Option<PackageScope>, ApiError> {
    match args.get("scope").and_then(Value::as_str) {
        None => Ok(None),
        Some(scope) => Ok(Some(scope.parse()?)),
    }
}
