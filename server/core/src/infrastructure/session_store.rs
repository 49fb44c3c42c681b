// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Session Store
//!
//! Sessions live in a process-wide `DashMap`. With a TTL configured, idle
//! sessions are replaced on their next load and swept from the map every
//! [`SWEEP_EVERY`] issued sessions.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::session::{Session, SessionStore};

/// Issued sessions between two sweeps of expired entries
pub const SWEEP_EVERY: usize = 128;

/// Process-wide session map with optional idle expiry
pub struct InMemorySessionStore {
    // Maps session id -> Session
    sessions: Arc<DashMap<String, Session>>,
    ttl: Option<Duration>,
    issued: AtomicUsize,
}

impl InMemorySessionStore {
    pub fn new(ttl_seconds: Option<u64>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: ttl_seconds
                .and_then(|s| i64::try_from(s).ok())
                .and_then(Duration::try_seconds),
            issued: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn expired(&self, session: &Session) -> bool {
        match self.ttl {
            Some(ttl) => Utc::now() - session.last_seen > ttl,
            None => false,
        }
    }

    /// Drop every expired session; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.expired(session));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "Swept expired sessions");
        }
        removed
    }

    fn issue(&self) -> Session {
        if (self.issued.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.sweep_expired();
        }
        let session = Session::new(Uuid::new_v4().to_string());
        self.sessions.insert(session.id.clone(), session.clone());
        debug!(sid = %session.id, "Issued session");
        session
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Option<&str>) -> Session {
        let Some(id) = id else {
            return self.issue();
        };

        let existing = self.sessions.get_mut(id).map(|mut entry| {
            let expired = self.expired(&entry);
            if !expired {
                entry.last_seen = Utc::now();
            }
            (expired, entry.clone())
        });

        match existing {
            Some((false, session)) => session,
            Some((true, _)) => {
                self.sessions.remove(id);
                debug!(sid = %id, "Session expired");
                self.issue()
            }
            None => self.issue(),
        }
    }

    async fn save(&self, session: &Session) {
        // Destroyed sessions stay destroyed
        if let Some(mut entry) = self.sessions.get_mut(&session.id) {
            *entry = session.clone();
        }
    }

    async fn destroy(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            debug!(sid = %id, "Session destroyed");
        }
    }
}
