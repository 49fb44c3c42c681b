// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Client sessions
//!
//! A session is created on the first request that carries no (or an
//! unknown) session id and is bound to a user on `login`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group granting every permission
pub const ADMIN_GROUP: &str = "admin";

/// Authenticated user attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user: Option<UserProfile>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user: None,
            created_at: now,
            last_seen: now,
        }
    }

    /// Session used by server components calling the VFS internally
    pub fn system() -> Self {
        let mut session = Self::new("system");
        session.user = Some(UserProfile {
            id: "0".to_string(),
            username: "system".to_string(),
            name: "System".to_string(),
            groups: vec![ADMIN_GROUP.to_string()],
        });
        session
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn groups(&self) -> &[String] {
        self.user.as_ref().map(|u| u.groups.as_slice()).unwrap_or(&[])
    }

    pub fn is_admin(&self) -> bool {
        self.groups().iter().any(|g| g == ADMIN_GROUP)
    }

    /// True when the user is `admin` or in at least one of `required`.
    /// An empty requirement always passes.
    pub fn in_any_group(&self, required: &[String]) -> bool {
        required.is_empty()
            || self.is_admin()
            || self.groups().iter().any(|g| required.contains(g))
    }
}

/// Backing store for sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up `id`, or start a fresh session when it is missing or expired
    async fn load(&self, id: Option<&str>) -> Session;

    async fn save(&self, session: &Session);

    async fn destroy(&self, id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(groups: &[&str]) -> UserProfile {
        UserProfile {
            id: "1".to_string(),
            username: "alice".to_string(),
            name: "Alice".to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn test_anonymous_session() {
        let session = Session::new("abc");
        assert_eq!(session.username(), None);
        assert!(session.groups().is_empty());
        assert!(!session.in_any_group(&["users".to_string()]));
        assert!(session.in_any_group(&[]));
    }

    #[test]
    fn test_group_membership() {
        let session = Session::new("abc").with_user(user(&["users"]));
        assert!(session.in_any_group(&["users".to_string(), "staff".to_string()]));
        assert!(!session.in_any_group(&["staff".to_string()]));

        let admin = Session::new("def").with_user(user(&[ADMIN_GROUP]));
        assert!(admin.in_any_group(&["staff".to_string()]));
    }
}
