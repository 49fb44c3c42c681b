// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offline package manifest maintenance
//!
//! Commands: generate, list

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::sync::Arc;

use cloudesk_core::domain::config::ServerConfig;
use cloudesk_core::domain::package::PackageScope;
use cloudesk_core::domain::session::{Session, UserProfile, ADMIN_GROUP};
use cloudesk_core::presentation::app::{build_dispatcher, build_package_manager};

#[derive(Subcommand)]
pub enum PackagesCommand {
    /// Regenerate user package manifests
    Generate {
        /// User whose `%USERNAME%` mounts are scanned
        #[arg(long, default_value = "system")]
        user: String,

        /// VFS directories to scan (default: `packages.user_paths`)
        #[arg(value_name = "PATH")]
        paths: Vec<String>,
    },

    /// Print the merged package manifest as JSON
    List {
        #[arg(long, default_value = "system")]
        user: String,

        /// Only one tier: `system` or `user`
        #[arg(long)]
        scope: Option<PackageScope>,
    },
}

pub async fn handle_command(command: PackagesCommand, config: ServerConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let vfs = Arc::new(build_dispatcher(&config));
    let packages = build_package_manager(&config, vfs);

    match command {
        PackagesCommand::Generate { user, paths } => {
            let session = offline_session(&user);
            let paths = if paths.is_empty() {
                packages.user_paths().to_vec()
            } else {
                paths
            };
            packages
                .cache(&session, "generate", Some(PackageScope::User), Some(paths.as_slice()))
                .await
                .context("Failed to generate package manifests")?;
            for path in &paths {
                println!("{} {}", "✓ Generated".green(), path);
            }
            Ok(())
        }
        PackagesCommand::List { user, scope } => {
            let session = offline_session(&user);
            let manifest = packages
                .list(&session, scope, None)
                .await
                .context("Failed to list packages")?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
    }
}

fn offline_session(username: &str) -> Session {
    Session::new("cli").with_user(UserProfile {
        id: "0".to_string(),
        username: username.to_string(),
        name: username.to_string(),
        groups: vec![ADMIN_GROUP.to_string()],
    })
}
