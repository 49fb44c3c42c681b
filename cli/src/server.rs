// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server lifecycle: build services, listen, drain on shutdown

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use cloudesk_core::domain::config::{ConnectionMode, ServerConfig};
use cloudesk_core::presentation::{build_state, router};

pub async fn run(config: ServerConfig) -> Result<()> {
    let state = build_state(&config).context("Failed to initialize services")?;
    let auth = state.pipeline.auth().clone();

    auth.register()
        .await
        .context("Failed to register authenticator")?;

    if config.metrics.enabled {
        install_metrics_exporter(&config.http.bind_address, config.metrics.port)?;
    }

    let app = router(state);

    let addr = format!("{}:{}", config.http.bind_address, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(
        address = %addr,
        dist = %config.http.dist.display(),
        "Cloudesk listening"
    );
    if config.http.mode == ConnectionMode::Ws {
        info!(path = %config.http.ws_path, "WebSocket endpoint enabled");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server shutting down");

    if let Err(e) = auth.destroy().await {
        error!(error = %e, "Authenticator shutdown failed");
    }

    Ok(())
}

fn install_metrics_exporter(bind_address: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", bind_address, port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
