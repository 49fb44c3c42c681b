// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use cloudesk_core::domain::config::ServerConfig;
use cloudesk_core::domain::mount::Mountpoint;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the full configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config: ServerConfig,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(&config, config_override, paths, yaml),
        ConfigCommand::Validate { file } => match file {
            Some(path) => validate(&ServerConfig::load_or_default(Some(path))?),
            None => validate(&config),
        },
    }
}

fn show(
    config: &ServerConfig,
    config_override: Option<PathBuf>,
    show_paths: bool,
    yaml: bool,
) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CLOUDESK_CONFIG_PATH: {}",
            std::env::var("CLOUDESK_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./cloudesk.json, ./cloudesk.yaml");
        println!("  4. ~/.cloudesk/config.yaml");
        println!("  5. /etc/cloudesk/config.yaml");
        println!();
    }

    if yaml {
        print!("{}", config.to_yaml_string().context("Failed to render configuration")?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "HTTP:".bold());
    println!("  Listen: {}:{}", config.http.bind_address, config.http.port);
    println!("  Mode: {:?}", config.http.mode);
    println!("  Dist: {}", config.http.dist.display());
    println!("  Session cookie: {}", config.http.session_cookie);
    println!();

    println!("{}", "Mountpoints:".bold());
    if config.vfs.mounts.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (protocol, mount) in &config.vfs.mounts {
        let mount = Mountpoint::from_config(protocol, mount);
        let mut flags = Vec::new();
        if mount.read_only {
            flags.push("ro".to_string());
        }
        if !mount.enabled {
            flags.push("disabled".to_string());
        }
        if !mount.groups.is_empty() {
            flags.push(format!("groups={}", mount.groups.join(",")));
        }
        println!(
            "  {}:/// -> {} [{}] {}",
            protocol.bold(),
            mount.destination.as_deref().unwrap_or("(none)"),
            mount.transport,
            flags.join(" ")
        );
    }
    println!();

    println!("{}", "Modules:".bold());
    println!("  Auth: {} ({} static users)", config.auth.module, config.auth.users.len());
    println!("  Storage: {}", config.storage.module);
    println!("  Proxies: {}", config.proxies.len());
    println!(
        "  Metrics: {}",
        if config.metrics.enabled {
            format!("enabled on port {}", config.metrics.port)
        } else {
            "disabled".to_string()
        }
    );
    println!();

    Ok(())
}

fn validate(config: &ServerConfig) -> Result<()> {
    println!("Validating configuration...");

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
