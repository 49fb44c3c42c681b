// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Per-user settings storage

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings must be a JSON object")]
    InvalidSettings,

    #[error("Settings storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for SettingsError {
    fn from(err: std::io::Error) -> Self {
        SettingsError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    fn name(&self) -> &str;

    /// Stored settings, or an empty object for a user that has none
    async fn get(&self, username: &str) -> Result<Value, SettingsError>;

    /// Replace the user's settings wholesale
    async fn set(&self, username: &str, settings: Value) -> Result<(), SettingsError>;
}
