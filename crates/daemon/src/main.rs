//! Cadence - Scheduler Daemon Entry Point
//!
//! Wires SQLite storage, the webhook notifier and the JSON-RPC surface around
//! the dispatch cycle, then sweeps on an interval until SIGINT/SIGTERM.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cadence_api_rpc::{RpcServer, RpcServerConfig};
use cadence_core::application::{
    shutdown_channel, DispatchConfig, DispatchCycle, ScheduleService, SweepRunner,
};
use cadence_core::port::id_provider::UuidProvider;
use cadence_core::port::time_provider::SystemTimeProvider;
use cadence_core::port::{IdProvider, Notifier, ScheduledTaskRepository, TimeProvider};
use cadence_infra_sqlite::{create_pool, run_migrations, SqliteScheduledTaskRepository};
use cadence_infra_webhook::WebhookNotifier;

use crate::config::DaemonConfig;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging first, so config errors are visible
    let _telemetry = telemetry::init_tracing()?;
    info!("Cadence v{} starting...", cadence_core::VERSION);

    // 2. Configuration
    let config = DaemonConfig::load()?;
    info!(
        db_path = %config.db_path,
        rpc_port = config.rpc_port,
        sweep_interval_secs = config.sweep_interval_secs,
        lookahead_secs = config.lookahead_secs,
        "Configuration loaded"
    );

    // 3. Database
    ensure_db_dir(&config.db_path)?;
    let pool = create_pool(&config.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let repository: Arc<dyn ScheduledTaskRepository> =
        Arc::new(SqliteScheduledTaskRepository::new(pool.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(config.notify_timeout())?);

    let schedules = Arc::new(ScheduleService::new(
        repository.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));

    let dispatch_config = DispatchConfig {
        lookahead: chrono_duration(config.lookahead()),
        max_concurrent_notifications: config.max_concurrent_notifications,
    };
    let cycle = DispatchCycle::new(
        repository,
        notifier,
        id_provider,
        time_provider.clone(),
        dispatch_config,
    );
    let sweeper = Arc::new(SweepRunner::new(
        cycle,
        time_provider,
        config.sweep_interval(),
    ));

    // 5. JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, schedules, sweeper.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;
    info!(addr = %rpc_addr, "JSON-RPC server listening");

    // 6. Sweep loop
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let sweep_handle = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move {
            if let Err(e) = sweeper.run(shutdown_rx).await {
                error!(error = %e, "Sweep runner failed");
            }
        })
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    wait_for_signal().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, sweep_handle).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Sweep did not stop in time"
        );
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::seconds(d.as_secs() as i64)
}

/// Create the parent directory of a file-backed database
fn ensure_db_dir(db_path: &str) -> Result<()> {
    if db_path.starts_with("sqlite:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
