// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Static Users Authenticator
//!
//! Accounts come from `auth.users` in the server configuration. Passwords
//! are stored as hex SHA-256 digests and compared in constant time.
//! Authorization is group based:
//!
//! - `api` requests consult `auth.api_groups` (unlisted methods are open)
//! - `vfs` requests need membership in the `groups` of every touched mount
//! - `package` requests need membership in the package's `groups`
//!
//! Members of `admin` pass every group check.

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::domain::auth::{AuthError, Authenticator, LoginRequest, PermissionRequest};
use crate::domain::config::{AuthConfig, StaticUserConfig};
use crate::domain::session::{Session, UserProfile};

struct Account {
    profile: UserProfile,
    digest: Vec<u8>,
}

pub struct StaticAuthenticator {
    accounts: HashMap<String, Account>,
    api_groups: BTreeMap<String, Vec<String>>,
}

impl StaticAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut accounts = HashMap::new();
        for (index, user) in config.users.iter().enumerate() {
            let account = Self::account(index, user)?;
            if accounts.insert(user.username.clone(), account).is_some() {
                return Err(AuthError::Internal(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
        }

        if accounts.is_empty() {
            warn!("Static authenticator has no users configured; nobody can log in");
        }

        Ok(Self {
            accounts,
            api_groups: config.api_groups.clone(),
        })
    }

    fn account(index: usize, user: &StaticUserConfig) -> Result<Account, AuthError> {
        let digest = hex::decode(user.password_sha256.trim()).map_err(|e| {
            AuthError::Internal(format!("user '{}' has an invalid password digest: {}", user.username, e))
        })?;
        if digest.len() != 32 {
            return Err(AuthError::Internal(format!(
                "user '{}' password digest must be 32 bytes",
                user.username
            )));
        }

        Ok(Account {
            profile: UserProfile {
                id: user.id.clone().unwrap_or_else(|| (index + 1).to_string()),
                username: user.username.clone(),
                name: user.name.clone().unwrap_or_else(|| user.username.clone()),
                groups: user.groups.clone(),
            },
            digest,
        })
    }

    fn require_groups(session: &Session, groups: &[String], what: &str) -> Result<(), AuthError> {
        if session.in_any_group(groups) {
            Ok(())
        } else {
            debug!(sid = %session.id, target = what, "Group check failed");
            Err(AuthError::AccessDenied(what.to_string()))
        }
    }
}

/// Hex SHA-256 digest of `password`, the form stored in `auth.users`
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn name(&self) -> &str {
        "static"
    }

    async fn register(&self) -> Result<(), AuthError> {
        info!(users = self.accounts.len(), "Static authenticator registered");
        Ok(())
    }

    async fn login(&self, session: &mut Session, request: &LoginRequest) -> Result<UserProfile, AuthError> {
        let account = self
            .accounts
            .get(&request.username)
            .ok_or(AuthError::InvalidCredentials)?;

        let supplied = Sha256::digest(request.password.as_bytes());
        if !bool::from(supplied.as_slice().ct_eq(account.digest.as_slice())) {
            warn!(username = %request.username, "Rejected login");
            return Err(AuthError::InvalidCredentials);
        }

        session.user = Some(account.profile.clone());
        Ok(account.profile.clone())
    }

    async fn manage(&self, session: &Session, command: &str, _args: &Value) -> Result<Value, AuthError> {
        match command {
            "list" => {
                if !session.is_admin() {
                    return Err(AuthError::AccessDenied("users".to_string()));
                }
                let mut users: Vec<&UserProfile> = self.accounts.values().map(|a| &a.profile).collect();
                users.sort_by(|a, b| a.username.cmp(&b.username));
                Ok(json!(users))
            }
            other => Err(AuthError::Unavailable(format!("manage '{}' is not supported", other))),
        }
    }

    async fn check_permission(
        &self,
        session: &Session,
        request: &PermissionRequest<'_>,
    ) -> Result<(), AuthError> {
        match request {
            PermissionRequest::Api { method } => match self.api_groups.get(*method) {
                Some(groups) => Self::require_groups(session, groups, method),
                None => Ok(()),
            },
            PermissionRequest::Vfs { mounts, .. } => {
                for mount in mounts {
                    Self::require_groups(session, &mount.groups, &mount.protocol)?;
                }
                Ok(())
            }
            PermissionRequest::Package { id, metadata } => {
                Self::require_groups(session, &metadata.groups, id)
            }
        }
    }

    async fn check_session(&self, session: &Session) -> Result<(), AuthError> {
        match session.user {
            Some(_) => Ok(()),
            None => Err(AuthError::NoSession),
        }
    }
}
