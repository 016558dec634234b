use std::sync::Arc;

use courier_common::config::AppConfig;
use courier_common::db;
use courier_worker::dispatch::{DispatchConfig, DispatchWorker};
use courier_worker::gateway::HttpSmsGateway;
use courier_worker::retry::{RetryConfig, RetryWorker};
use courier_worker::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_worker=info,courier_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Build the gateway adapter and both workers
    let gateway = Arc::new(HttpSmsGateway::from_config(&config)?);
    let dispatch = DispatchWorker::new(
        pool.clone(),
        gateway.clone(),
        DispatchConfig::from_app(&config)?,
    );
    let retry = RetryWorker::new(pool.clone(), gateway, RetryConfig::from_app(&config));

    let scheduler = Scheduler::new(pool, dispatch, retry, config);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Courier worker stopped.");
    Ok(())
}
