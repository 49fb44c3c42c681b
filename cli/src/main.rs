// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Cloudesk Server CLI
//!
//! The `cloudesk` binary runs the web desktop backend and a handful of
//! offline administration commands.
//!
//! ## Commands
//!
//! - `cloudesk` / `cloudesk serve` - Run the HTTP (and WebSocket) server
//! - `cloudesk config show|validate` - Inspect the effective configuration
//! - `cloudesk packages generate|list` - Maintain package manifests offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use cloudesk_core::domain::config::{LoggingConfig, ServerConfig};

mod commands;
mod server;

use commands::{ConfigCommand, PackagesCommand};

/// Cloudesk - web desktop backend
#[derive(Parser)]
#[command(name = "cloudesk")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CLOUDESK_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to `logging.level`
    #[arg(long, global = true, env = "CLOUDESK_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Package manifest maintenance
    #[command(name = "packages")]
    Packages {
        #[command(subcommand)]
        command: PackagesCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The configured filter is unknown until the file is read
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.log_level.as_deref().unwrap_or("info"))?)
        .with_target(false)
        .compact()
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        ServerConfig::load_or_default(cli.config.clone())
    })
    .context("Failed to load configuration")?;

    init_logging(cli.log_level.as_deref(), &config.logging)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            info!("Starting Cloudesk server");
            server::run(config).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, config, cli.config).await
        }
        Some(Commands::Packages { command }) => {
            commands::packages::handle_command(command, config).await
        }
    }
}

/// Initialize tracing subscriber for logging
///
/// `RUST_LOG` wins over `--log-level`, which wins over `logging.level`.
fn init_logging(cli_level: Option<&str>, logging: &LoggingConfig) -> Result<()> {
    let filter = log_filter(cli_level.unwrap_or(&logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn log_filter(level: &str) -> Result<tracing_subscriber::EnvFilter> {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loads_under_bootstrap_subscriber() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cloudesk.yaml");
        std::fs::write(&path, "logging:\n  level: debug\n").unwrap();

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(log_filter("info").unwrap())
            .finish();
        let config = tracing::subscriber::with_default(subscriber, || {
            ServerConfig::load_or_default(Some(path.clone()))
        })
        .unwrap();
        assert_eq!(config.logging.level, "debug");
    }
}
