//! Serve command implementation.

use crate::server::{start_server, ServerState};
use anyhow::Result;
use nearby_core::{Config, ProximityService};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Run the service until SIGINT or SIGTERM.
pub async fn run(mut config: Config, port: Option<u16>, no_sync: bool) -> Result<()> {
    // Apply CLI overrides
    if let Some(port) = port {
        config.server.port = port;
    }
    if no_sync {
        config.index_sync.enabled = false;
    }
    config.validate()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        metrics_port = config.monitoring.metrics_port,
        sync_delay_ms = config.index_sync.delay_ms,
        "Starting proximity service"
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let metrics_port = config.monitoring.metrics_port;

    let service = Arc::new(ProximityService::new(config).await?);
    service.start().await;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_state = Arc::new(ServerState {
        service: Arc::clone(&service),
    });
    let server_shutdown_rx = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        start_server(server_state, &host, port, metrics_port, server_shutdown_rx).await
    });

    // Spawn a task to handle shutdown signals (SIGINT and SIGTERM)
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_signal.send(());
    });

    let result = match server.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("server task panicked: {}", e)),
    };

    service.stop().await?;
    info!("Proximity service stopped");
    result
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, using Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}
