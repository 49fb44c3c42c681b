// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Composition root: configuration in, router state out

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::application::package_manager::PackageManager;
use crate::application::request_pipeline::RequestPipeline;
use crate::application::vfs_dispatcher::VfsDispatcher;
use crate::domain::auth::AuthError;
use crate::domain::config::{ConfigError, ServerConfig};
use crate::domain::mime::MimeTable;
use crate::domain::path_resolver::{PathResolver, ResolverEnv};
use crate::domain::settings::SettingsError;
use crate::infrastructure::{auth, default_registry, settings_store, InMemorySessionStore};
use crate::presentation::http::AppState;
use crate::presentation::proxy::ProxyTable;
use crate::presentation::static_files::StaticFiles;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Authenticator setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Settings storage setup failed: {0}")]
    Settings(#[from] SettingsError),
}

/// VFS dispatcher wired to the configured mounts and built-in transports
pub fn build_dispatcher(config: &ServerConfig) -> VfsDispatcher {
    let resolver = PathResolver::new(
        Arc::new(config.mount_table()),
        ResolverEnv {
            dist: config.http.dist.clone(),
            root: config.http.root.clone(),
        },
    );
    VfsDispatcher::new(resolver, default_registry(), MimeTable::new(&config.mimes))
}

pub fn build_package_manager(config: &ServerConfig, vfs: Arc<VfsDispatcher>) -> PackageManager {
    PackageManager::new(
        vfs,
        config.system_manifest_path(),
        config.packages.user_paths.clone(),
    )
}

/// Validate `config` and build every service behind the router
pub fn build_state(config: &ServerConfig) -> Result<AppState, StartupError> {
    config.validate()?;

    let vfs = Arc::new(build_dispatcher(config));
    let packages = Arc::new(build_package_manager(config, vfs.clone()));
    let auth = auth::from_config(&config.auth)?;
    let settings = settings_store::from_config(&config.storage)?;
    let sessions = Arc::new(InMemorySessionStore::new(config.session.ttl_seconds));

    info!(
        mounts = config.vfs.mounts.len(),
        proxies = config.proxies.len(),
        auth = auth.name(),
        storage = settings.name(),
        "Services initialized"
    );

    let pipeline = Arc::new(RequestPipeline::new(vfs, auth, sessions, settings, packages));
    let proxy = ProxyTable::from_config(&config.proxies)?;
    let static_files = StaticFiles::new(config.http.dist.clone(), MimeTable::new(&config.mimes));

    Ok(AppState::new(pipeline, proxy, static_files, &config.http))
}
