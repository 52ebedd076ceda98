use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use foodshare_core::Config;
use foodshare_db::{FileRepository, MIGRATOR};
use foodshare_infra::{init_telemetry, shutdown_telemetry};
use foodshare_worker::{LocalTransfer, UploadWorkerConfig, UploadWorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    init_telemetry("foodshare-worker", config.environment(), config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let worker_id = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(worker_id = %worker_id, "Starting upload worker");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url())
        .await
        .context("Failed to connect to database")?;
    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    if config.run_migrations() {
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");
    }

    let transfer = LocalTransfer::new(
        config.staging_path(),
        config.storage_path(),
        config.storage_base_url().to_string(),
    )
    .await
    .context("Failed to set up local storage")?;

    let workers = UploadWorkerPool::new(
        Arc::new(FileRepository::new(pool.clone())),
        Arc::new(transfer),
        UploadWorkerConfig::from(&config),
        Some(pool.clone()),
    );

    shutdown_signal().await?;

    workers.shutdown().await;
    pool.close().await;
    shutdown_telemetry().await;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to install signal handler")?;
        tokio::select! {
            result = ctrl_c => {
                result.context("Failed to install Ctrl+C handler")?;
                tracing::info!("Received Ctrl+C signal");
            }
            _ = terminate.recv() => {
                tracing::info!("Received terminate signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to install Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C signal");
    }

    Ok(())
}
