// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authenticator that lets everyone in

use async_trait::async_trait;
use tracing::debug;

use crate::domain::auth::{AuthError, Authenticator, LoginRequest, PermissionRequest};
use crate::domain::session::{Session, UserProfile, ADMIN_GROUP};

const DEFAULT_USERNAME: &str = "demo";

#[derive(Debug, Default)]
pub struct NullAuthenticator;

impl NullAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NullAuthenticator {
    fn name(&self) -> &str {
        "null"
    }

    async fn login(&self, session: &mut Session, request: &LoginRequest) -> Result<UserProfile, AuthError> {
        let username = match request.username.trim() {
            "" => DEFAULT_USERNAME,
            name => name,
        };
        // Usernames end up in mount templates
        if username == "." || username == ".." || username.contains(['/', '\\', '\0']) {
            return Err(AuthError::InvalidCredentials);
        }
        let user = UserProfile {
            id: "0".to_string(),
            username: username.to_string(),
            name: username.to_string(),
            groups: vec![ADMIN_GROUP.to_string()],
        };
        session.user = Some(user.clone());
        Ok(user)
    }

    async fn check_permission(
        &self,
        session: &Session,
        request: &PermissionRequest<'_>,
    ) -> Result<(), AuthError> {
        debug!(sid = %session.id, kind = request.kind().as_str(), "Null authenticator allows request");
        Ok(())
    }

    async fn check_session(&self, _session: &Session) -> Result<(), AuthError> {
        Ok(())
    }
}
