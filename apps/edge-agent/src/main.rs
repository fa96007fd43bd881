mod config;
mod grpc;
mod mqtt;
mod netconfig;
mod onboard;
mod scan;

use crate::config::EdgeConfig;
use crate::grpc::IptoolClient;
use crate::onboard::OnboardClient;
use crate::scan::ScanEngine;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,edge_agent=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let config = EdgeConfig::from_env()?;
    tracing::info!(edge_id = %config.edge_id, version = %config.version, "edge agent starting");

    let engine = Arc::new(ScanEngine::new(config.ipcscan_timeout));
    let iptool = IptoolClient::new(&config.iptool_target);
    let onboard = OnboardClient::new(&config.server_base_url)?;

    let cancel = CancellationToken::new();

    let scan_server = tokio::spawn(grpc::serve_scan(
        config.grpc_port,
        engine.clone(),
        cancel.clone(),
    ));
    let iptool_server = tokio::spawn(grpc::serve_iptool(config.iptool_port(), cancel.clone()));

    if let Err(err) = onboard
        .report_online(&config.edge_id, &config.version)
        .await
    {
        tracing::warn!(error = %err, "initial online handshake failed");
    }

    let (watchdog, watchdog_task) = mqtt::watchdog::spawn(
        onboard.clone(),
        config.edge_id.clone(),
        config.version.clone(),
        mqtt::watchdog::COMMAND_SILENCE_TIMEOUT,
    );

    let mqtt_task = tokio::spawn(mqtt::run(
        config.clone(),
        engine,
        iptool,
        watchdog,
        cancel.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = mqtt_task => {
            match result {
                Ok(Ok(())) => tracing::info!("MQTT workflow finished"),
                Ok(Err(err)) => tracing::error!(error = %err, "MQTT workflow failed"),
                Err(err) => tracing::error!(error = %err, "MQTT task panicked"),
            }
        }
        result = scan_server => {
            if let Ok(Err(err)) = result {
                tracing::error!(error = %err, "IPCScan server exited");
            }
        }
        result = iptool_server => {
            if let Ok(Err(err)) = result {
                tracing::error!(error = %err, "IPtool server exited");
            }
        }
    }

    cancel.cancel();
    watchdog_task.abort();
    Ok(())
}
