//! Publisher wiring and lifecycle.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use nostr_relay_transport::WebSocketTransport;
use publish_retriable_worker::{PublishWorker, PublishWorkerConfig};
use relay_set::RelaySet;
use scheduler_config_and_utils::{Config, Paths};
use scheduler_database::AsyncDatabase;
use tokio::sync::oneshot;
use tracing::{info, warn};

async fn build_worker(
    config: &Config,
    paths: &Paths,
) -> anyhow::Result<(PublishWorker, AsyncDatabase)> {
    let db_path = config.database_path(paths);
    let db = AsyncDatabase::open(&db_path)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    let relays = RelaySet::new(config.relays_path(paths));
    if let Err(e) = relays.ensure_file() {
        warn!(path = %relays.path().display(), error = %e, "Could not seed relay list");
    }

    let worker = PublishWorker::new(
        PublishWorkerConfig::from_config(config),
        db.clone(),
        Arc::new(relays),
        Arc::new(WebSocketTransport::new(config.relay_connect_timeout())),
    );
    Ok((worker, db))
}

/// Run the scheduler loop until Ctrl-C or SIGTERM.
pub async fn run_publisher(config: Config, paths: Paths) -> anyhow::Result<()> {
    let (worker, db) = build_worker(&config, &paths).await?;

    info!(
        base_dir = %paths.base_dir().display(),
        database = %db.path(),
        "Starting schdlstr publisher"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = worker.spawn(shutdown_rx);

    wait_for_shutdown_signal().await;
    info!("Shutdown requested, waiting for the current cycle");

    let _ = shutdown_tx.send(());
    if let Err(e) = handle.await {
        warn!(error = %e, "Publish worker task ended abnormally");
    }

    db.close().await?;
    info!("schdlstr publisher stopped");
    Ok(())
}

/// Run exactly one publish cycle.
pub async fn run_once(config: Config, paths: Paths) -> anyhow::Result<()> {
    let (worker, db) = build_worker(&config, &paths).await?;

    let report = worker.run_cycle(Utc::now()).await?;
    println!(
        "due: {}  sent: {}  failed: {}  committed: {}",
        report.due, report.sent, report.failed, report.applied
    );

    db.close().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl-C");
}
