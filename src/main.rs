use anyhow::Result;
use axum::Router;
use std::io::ErrorKind;
use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting filedrop with config: {:?}", cfg);
    tracing::info!("max upload size: {}", cfg.max_size);
    tracing::info!("max lifetime: {}s", cfg.max_lifetime);

    // --- Initialize storage (creates uploads/, metadata/, staging/) ---
    let storage =
        services::storage_manager::StorageManager::open(&cfg.storage_settings()).await?;
    tracing::info!("storing files under {}", cfg.data_dir.display());

    // --- Start expiry sweeps ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tracing::info!(
        "starting cleanup loop every {}s",
        cfg.sweep_interval_secs
    );
    let reaper = storage.reaper().spawn(cfg.sweep_interval(), shutdown_rx);

    // --- Build router ---
    let app: Router = routes::routes::routes(&storage, &cfg.web_root, cfg.request_timeout())
        .with_state(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Stop the reaper once connections have drained ---
    let _ = shutdown_tx.send(true);
    reaper.await?;
    tracing::info!("shutting down");

    Ok(())
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
