use anyhow::{Context, Result};
use gatewayd_config::{parse_config, validate_config};
use gatewayd_runtime::GatewayServer;
use std::path::Path;

pub async fn execute(config_path: &str) -> Result<()> {
    let config =
        parse_config(Path::new(config_path)).context("failed to parse gateway config")?;
    validate_config(&config).context("gateway config failed validation")?;

    tracing::info!(
        name = %config.gateway.name,
        host = %config.gateway.host,
        port = config.gateway.port,
        backends = config.backends.len(),
        "starting gatewayd"
    );

    let server = GatewayServer::new(&config);
    let running = server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        running.stop().await;
    });

    server.run().await.context("gateway server error")?;
    Ok(())
}

/// Waits for Ctrl+C (all platforms) or SIGTERM (Unix), whichever comes
/// first (spec §9 "Shutdown").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, stopping gatewayd");
}
