// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authenticator Implementations
//!
//! `null` accepts any username without a password, `static` checks
//! SHA-256 password digests from the configuration. [`from_config`] picks
//! one by `auth.module`.

pub mod null;
pub mod static_users;

pub use null::NullAuthenticator;
pub use static_users::{password_digest, StaticAuthenticator};

use std::sync::Arc;
use tracing::info;

use crate::domain::auth::{AuthError, Authenticator};
use crate::domain::config::AuthConfig;

/// Build the authenticator named by `auth.module`
pub fn from_config(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, AuthError> {
    let auth: Arc<dyn Authenticator> = match config.module.as_str() {
        "null" => Arc::new(NullAuthenticator::new()),
        "static" => Arc::new(StaticAuthenticator::from_config(config)?),
        other => {
            return Err(AuthError::Internal(format!(
                "unknown authentication module '{}'",
                other
            )))
        }
    };
    info!(module = auth.name(), "Authenticator selected");
    Ok(auth)
}
