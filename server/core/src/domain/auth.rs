// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authenticator contract
//!
//! Every protected request passes `check_session` (skipped only for the
//! `login` API call) and then `check_permission` with a [`PermissionRequest`].
//! A rejection from either step ends the request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::mount::Mountpoint;
use crate::domain::package::PackageMetadata;
use crate::domain::session::{Session, UserProfile};
use crate::domain::vfs::VfsMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    Vfs,
    Api,
    Package,
}

impl PermissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::Vfs => "vfs",
            PermissionKind::Api => "api",
            PermissionKind::Package => "package",
        }
    }
}

/// Context for a permission decision
#[derive(Debug, Clone)]
pub enum PermissionRequest<'a> {
    Vfs {
        method: VfsMethod,
        /// Mounts touched by the call (`src` and `dest` for copy/move)
        mounts: Vec<Mountpoint>,
    },
    Api {
        method: &'a str,
    },
    Package {
        id: &'a str,
        metadata: &'a PackageMetadata,
    },
}

impl PermissionRequest<'_> {
    pub fn kind(&self) -> PermissionKind {
        match self {
            PermissionRequest::Vfs { .. } => PermissionKind::Vfs,
            PermissionRequest::Api { .. } => PermissionKind::Api,
            PermissionRequest::Package { .. } => PermissionKind::Package,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("You have no session, please log in!")]
    NoSession,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Authenticator error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials | AuthError::NoSession | AuthError::AccessDenied(_) => 403,
            AuthError::Unavailable(_) | AuthError::Internal(_) => 500,
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at startup
    async fn register(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Called once at shutdown
    async fn destroy(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Verify credentials and bind the user to `session`
    async fn login(&self, session: &mut Session, request: &LoginRequest) -> Result<UserProfile, AuthError>;

    async fn logout(&self, session: &mut Session) -> Result<(), AuthError> {
        session.user = None;
        Ok(())
    }

    /// User administration (`users` API method)
    async fn manage(&self, _session: &Session, command: &str, _args: &Value) -> Result<Value, AuthError> {
        Err(AuthError::Unavailable(format!("manage '{}' is not supported", command)))
    }

    /// Hook run before a freshly loaded session is used
    async fn init_session(&self, _session: &mut Session) -> Result<(), AuthError> {
        Ok(())
    }

    async fn check_permission(
        &self,
        session: &Session,
        request: &PermissionRequest<'_>,
    ) -> Result<(), AuthError>;

    async fn check_session(&self, session: &Session) -> Result<(), AuthError>;
}
