//! weexd - daily summary maintenance daemon
//!
//! This binary coordinates:
//! - Rebuilding the daily summaries when no completed backfill is recorded
//! - Folding records another process appends to the archive
//! - Logging a short report as each archive day closes

mod config;
mod scheduler;

use anyhow::{Context, Result};
use tracing::{error, info};

use weex_daysum::DailySummaryStore;
use weex_db::DbConnectionBuilder;

use crate::config::DaemonConfig;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env()?;
    weewx_obs::init("weexd", &config.app.logging);

    info!("Starting weexd");
    info!("Loaded configuration: {:?}", config);

    let db = DbConnectionBuilder::new(config.database_path.clone())
        .create_if_missing(true)
        .busy_timeout(config.app.busy_timeout())
        .wal(true)
        .connect()
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    db.ping().context("Database ping failed")?;
    info!("Database connection verified");

    let store_config = config.app.store_config().context("Invalid store configuration")?;
    let store = DailySummaryStore::open(db, store_config).context("Failed to open daily summaries")?;
    info!(
        "Daily summaries open, unit system {}",
        store.effective_unit_system()
    );

    let mut scheduler = Scheduler::new(
        store,
        config.app.resolver_config(),
        config.app.summaries.trans_days,
        config.poll(),
    );

    let shutdown = shutdown_signal();

    info!("Daemon running - press Ctrl+C to stop");

    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                error!("Scheduler error: {:#}", e);
                return Err(e);
            }
        }
        _ = shutdown => {
            info!("Shutdown signal received");
            scheduler.stop().await?;
        }
    }

    info!("weexd stopped");
    Ok(())
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
