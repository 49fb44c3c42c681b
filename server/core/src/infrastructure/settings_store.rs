// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Settings storage modules
//!
//! `memory` keeps settings for the lifetime of the process, `file` writes
//! one `<username>.json` document per user under `storage.path`.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::config::StorageConfig;
use crate::domain::settings::{SettingsError, SettingsStore};

fn ensure_object(settings: &Value) -> Result<(), SettingsError> {
    if settings.is_object() {
        Ok(())
    } else {
        Err(SettingsError::InvalidSettings)
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    settings: DashMap<String, Value>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, username: &str) -> Result<Value, SettingsError> {
        Ok(self
            .settings
            .get(username)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn set(&self, username: &str, settings: Value) -> Result<(), SettingsError> {
        ensure_object(&settings)?;
        self.settings.insert(username.to_string(), settings);
        Ok(())
    }
}

pub struct FileSettingsStore {
    root: PathBuf,
}

impl FileSettingsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document(&self, username: &str) -> Result<PathBuf, SettingsError> {
        let valid = !username.is_empty()
            && username != "."
            && username != ".."
            && !username.contains(['/', '\\', '\0']);
        if !valid {
            return Err(SettingsError::Storage(format!(
                "invalid username for settings storage: {:?}",
                username
            )));
        }
        Ok(self.root.join(format!("{}.json", username)))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, username: &str) -> Result<Value, SettingsError> {
        let path = self.document(username)?;
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, username: &str, settings: Value) -> Result<(), SettingsError> {
        ensure_object(&settings)?;
        let path = self.document(username)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, serde_json::to_vec_pretty(&settings)?).await?;
        debug!(username, path = %path.display(), "Stored user settings");
        Ok(())
    }
}

/// Build the store named by `storage.module`
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn SettingsStore>, SettingsError> {
    let store: Arc<dyn SettingsStore> = match config.module.as_str() {
        "memory" => Arc::new(MemorySettingsStore::new()),
        "file" => {
            let path = config.path.clone().ok_or_else(|| {
                SettingsError::Storage("storage.path is required for the file module".to_string())
            })?;
            Arc::new(FileSettingsStore::new(path))
        }
        other => {
            return Err(SettingsError::Storage(format!(
                "unknown storage module '{}'",
                other
            )))
        }
    };
    info!(module = store.name(), "Settings storage selected");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.get("alice").await.unwrap(), json!({}));

        store.set("alice", json!({"theme": "dark"})).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), json!({"theme": "dark"}));
        assert!(matches!(
            store.set("alice", json!([1, 2])).await,
            Err(SettingsError::InvalidSettings)
        ));
    }

    #[tokio::test]
    async fn test_file_store_persists_per_user() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings"));

        assert_eq!(store.get("bob").await.unwrap(), json!({}));
        store.set("bob", json!({"locale": "sv_SE"})).await.unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("settings/bob.json")).unwrap();
        assert!(on_disk.contains("sv_SE"));

        let reopened = FileSettingsStore::new(dir.path().join("settings"));
        assert_eq!(reopened.get("bob").await.unwrap(), json!({"locale": "sv_SE"}));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_usernames() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path());
        assert!(store.get("../escape").await.is_err());
        assert!(store.set("..", json!({})).await.is_err());
    }

    #[test]
    fn test_factory() {
        let memory = StorageConfig {
            module: "memory".to_string(),
            path: None,
        };
        assert_eq!(from_config(&memory).unwrap().name(), "memory");

        let file = StorageConfig {
            module: "file".to_string(),
            path: None,
        };
        assert!(from_config(&file).is_err());
    }
}
