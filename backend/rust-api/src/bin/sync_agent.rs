use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use url::Url;

use studynest_api::{
    config::Config,
    models::Collection,
    offline::{
        spawn_auto_sync, spawn_health_probe, Connectivity, HttpSyncTransport, LocalStore,
        SyncCoordinator, SyncEvent,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "studynest_api=info".into()),
        )
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let sync = config.sync;

    let store = LocalStore::open(&sync.db_path)
        .with_context(|| format!("Failed to open local store at {}", sync.db_path))?;
    for collection in Collection::ALL {
        let counts = store.counts(collection).await?;
        tracing::info!(
            "{}: {} pending, {} synced, {} failed",
            collection,
            counts.pending,
            counts.synced,
            counts.failed
        );
    }

    let timeout = Duration::from_secs(sync.request_timeout_secs);
    let transport = HttpSyncTransport::new(&sync.server_url, timeout)
        .context("Invalid sync server URL")?;

    // Offline until the first successful probe
    let connectivity = Connectivity::new(false);
    let coordinator = Arc::new(
        SyncCoordinator::new(store, Arc::new(transport), connectivity.clone())
            .with_max_attempts(sync.max_attempts),
    );

    let mut events = coordinator.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::RecordFailed {
                    collection,
                    id,
                    status,
                    error,
                }) => tracing::warn!("{} {} left {}: {}", collection, id, status, error),
                Ok(event) => tracing::debug!("Sync event: {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Sync event log lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let auto_sync = spawn_auto_sync(coordinator.clone());

    let health_url = Url::parse(&sync.server_url)
        .and_then(|base| base.join("health"))
        .context("Invalid sync server URL")?;
    let probe_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build health probe client")?;
    let probe = spawn_health_probe(
        probe_client,
        health_url,
        Duration::from_secs(sync.probe_interval_secs.max(1)),
        connectivity,
    );

    // The first probe tick fires immediately; a drain also runs here in case
    // the server was already reachable before the listener attached.
    let report = coordinator.sync_pending_data().await;
    tracing::info!("Start-up drain: {:?}", report);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Stopping sync agent");

    probe.remove().await;
    auto_sync.remove().await;
    event_log.abort();

    Ok(())
}
