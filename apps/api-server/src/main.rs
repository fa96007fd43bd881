use anyhow::{Context, Result};
use api_server::{auth, config, db, grpc, routes, state};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
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

    let config = config::ApiConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;
    let repo = db::Repo::new(pool);
    let secrets = auth::SecretStore::load_or_generate(&config.secret_file)?;
    let tokens = Arc::new(auth::TokenService::new(secrets, repo.clone()));

    let state = state::AppState {
        config: config.clone(),
        repo,
        tokens: tokens.clone(),
    };

    let cancel = CancellationToken::new();
    let grpc_addr: SocketAddr = config
        .auth_grpc_bind
        .parse()
        .context("invalid REDSAFE_AUTH_GRPC_BIND")?;
    let grpc_cancel = cancel.clone();
    let grpc_handle = tokio::spawn(async move {
        if let Err(err) = grpc::serve(grpc_addr, tokens, grpc_cancel).await {
            tracing::error!(error = %err, "auth gRPC server exited");
        }
    });

    let app = routes::router(state);
    let listener = TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("failed to bind api-server listener on {}", config.http_bind))?;
    tracing::info!(bind = %config.http_bind, "api-server HTTP listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    grpc_handle.await.ok();
    Ok(())
}
