mod config;
mod grpc;
mod model;

use crate::config::InferenceConfig;
use crate::grpc::InferenceService;
use crate::model::LogisticModel;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = InferenceConfig::from_env()?;

    let model = LogisticModel::from_file(&config.model_path)
        .with_context(|| format!("load fall model from {}", config.model_path.display()))?;
    let service = InferenceService::new(Box::new(model));

    let addr: SocketAddr = config
        .grpc_bind
        .parse()
        .context("invalid REDSAFE_FALL_GRPC_BIND")?;

    let cancel = CancellationToken::new();
    let server = tokio::spawn(grpc::serve(addr, service, cancel.clone()));

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received");
    cancel.cancel();
    server.await?.ok();
    Ok(())
}
