use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;
use tokio::sync::broadcast;

use super::{
    connectivity::{Connectivity, ListenerHandle},
    error::{StoreError, SyncError},
    store::LocalStore,
    transport::SyncTransport,
};
use crate::{
    metrics::{SYNC_DRAINS_TOTAL, SYNC_RECORDS_TOTAL},
    models::records::{Collection, QuizAttemptRecord, SubmissionRecord, SyncRecord, SyncStatus},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const EVENT_CAPACITY: usize = 64;

/// Progress notifications, emitted before a drain, after each record and at the end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    DrainStarted,
    RecordSynced {
        collection: &'static str,
        id: String,
    },
    RecordFailed {
        collection: &'static str,
        id: String,
        status: SyncStatus,
        error: String,
    },
    DrainFinished {
        synced: usize,
        failed: usize,
        dead_lettered: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed,
    /// Connectivity reported offline; nothing was sent.
    NoConnectivity,
    /// Another drain cycle was already in flight.
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: DrainOutcome,
    pub attempted: usize,
    pub synced: usize,
    /// Failed this cycle but still pending.
    pub failed: usize,
    /// Failed this cycle and moved to the dead-letter bucket.
    pub dead_lettered: usize,
}

impl SyncReport {
    fn new(outcome: DrainOutcome) -> Self {
        Self {
            outcome,
            attempted: 0,
            synced: 0,
            failed: 0,
            dead_lettered: 0,
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// The server accepted the record directly.
    Delivered,
    /// Stored locally as `pending`; the next drain will deliver it.
    Queued { reason: String },
}

/// Replays locally pending records to the server.
pub struct SyncCoordinator {
    store: LocalStore,
    transport: Arc<dyn SyncTransport>,
    connectivity: Connectivity,
    max_attempts: u32,
    in_flight: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    pub fn new(
        store: LocalStore,
        transport: Arc<dyn SyncTransport>,
        connectivity: Connectivity,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            transport,
            connectivity,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            in_flight: AtomicBool::new(false),
            events,
        }
    }

    /// Failures allowed before a record is dead-lettered; `0` retries forever.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Writes a record to the server, falling back to the local store when
    /// offline or when the server write fails. Only storage errors propagate.
    pub async fn submit<R: SyncRecord>(&self, mut record: R) -> Result<SubmitOutcome, SyncError> {
        record.set_sync_status(SyncStatus::Pending);
        record.validate().map_err(|e| StoreError::InvalidRecord {
            collection: R::COLLECTION,
            reason: e.to_string(),
        })?;

        let reason = if self.connectivity.is_online() {
            let payload = serde_json::to_value(&record).map_err(StoreError::from)?;
            match self.transport.push(R::COLLECTION, &payload).await {
                Ok(()) => {
                    tracing::info!(
                        "Delivered {} record {} directly",
                        R::COLLECTION,
                        record.id()
                    );
                    return Ok(SubmitOutcome::Delivered);
                }
                Err(e) => {
                    tracing::warn!(
                        "Direct write of {} record {} failed, queueing: {}",
                        R::COLLECTION,
                        record.id(),
                        e
                    );
                    e.to_string()
                }
            }
        } else {
            "offline".to_string()
        };

        self.store.put(&record).await?;
        tracing::info!(
            "Queued {} record {} for background sync",
            R::COLLECTION,
            record.id()
        );
        Ok(SubmitOutcome::Queued { reason })
    }

    /// Runs one drain cycle over every collection. Never fails: per-record
    /// errors are logged and left for the next cycle.
    pub async fn sync_pending_data(&self) -> SyncReport {
        let Some(_guard) = DrainGuard::acquire(&self.in_flight) else {
            tracing::debug!("Drain already in flight, skipping");
            SYNC_DRAINS_TOTAL.with_label_values(&["already_running"]).inc();
            return SyncReport::new(DrainOutcome::AlreadyRunning);
        };

        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping drain");
            SYNC_DRAINS_TOTAL.with_label_values(&["offline"]).inc();
            return SyncReport::new(DrainOutcome::NoConnectivity);
        }

        self.emit(SyncEvent::DrainStarted);
        let mut report = SyncReport::new(DrainOutcome::Completed);

        self.drain::<QuizAttemptRecord>(&mut report).await;
        self.drain::<SubmissionRecord>(&mut report).await;

        tracing::info!(
            "Drain finished: attempted={}, synced={}, failed={}, dead_lettered={}",
            report.attempted,
            report.synced,
            report.failed,
            report.dead_lettered
        );
        SYNC_DRAINS_TOTAL.with_label_values(&["completed"]).inc();
        self.emit(SyncEvent::DrainFinished {
            synced: report.synced,
            failed: report.failed,
            dead_lettered: report.dead_lettered,
        });

        report
    }

    async fn drain<R: SyncRecord>(&self, report: &mut SyncReport) {
        let collection = R::COLLECTION;
        let pending = match self.store.get_pending::<R>().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("Failed to read pending {} records: {}", collection, e);
                return;
            }
        };

        if pending.is_empty() {
            return;
        }
        tracing::info!("Syncing {} pending {} records", pending.len(), collection);

        for record in pending {
            report.attempted += 1;
            let id = record.id().to_string();

            let delivery = match serde_json::to_value(&record) {
                Ok(payload) => self.transport.push(collection, &payload).await,
                Err(e) => Err(SyncError::Store(StoreError::from(e))),
            };

            match delivery {
                Ok(()) => match self.store.mark_synced(collection, &id).await {
                    Ok(()) => {
                        report.synced += 1;
                        SYNC_RECORDS_TOTAL
                            .with_label_values(&[collection.as_str(), "synced"])
                            .inc();
                        self.emit(SyncEvent::RecordSynced {
                            collection: collection.as_str(),
                            id,
                        });
                    }
                    Err(e) => {
                        // Delivered, but the next cycle will send it again.
                        tracing::error!(
                            "Failed to mark {} record {} synced: {}",
                            collection,
                            id,
                            e
                        );
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!("Sync of {} record {} failed: {}", collection, id, error);

                    // Only a server rejection counts toward the ceiling; a dropped
                    // connection says nothing about the record itself.
                    let status = if matches!(e, SyncError::SyncRequestFailed { .. }) {
                        match self
                            .store
                            .record_failure(collection, &id, &error, self.max_attempts)
                            .await
                        {
                            Ok(status) => status,
                            Err(store_err) => {
                                tracing::error!(
                                    "Failed to record sync failure for {} record {}: {}",
                                    collection,
                                    id,
                                    store_err
                                );
                                SyncStatus::Pending
                            }
                        }
                    } else {
                        SyncStatus::Pending
                    };

                    if status == SyncStatus::Failed {
                        tracing::error!(
                            "{} record {} exceeded {} attempts, moved to dead letters",
                            collection,
                            id,
                            self.max_attempts
                        );
                        report.dead_lettered += 1;
                        SYNC_RECORDS_TOTAL
                            .with_label_values(&[collection.as_str(), "dead_lettered"])
                            .inc();
                    } else {
                        report.failed += 1;
                        SYNC_RECORDS_TOTAL
                            .with_label_values(&[collection.as_str(), "failed"])
                            .inc();
                    }

                    self.emit(SyncEvent::RecordFailed {
                        collection: collection.as_str(),
                        id,
                        status,
                        error,
                    });
                }
            }
        }
    }

    pub async fn dead_letters<R: SyncRecord>(&self) -> Result<Vec<R>, StoreError> {
        self.store.get_failed::<R>().await
    }

    /// Manual retry: puts a dead-lettered record back in the queue.
    pub async fn retry_failed(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let requeued = self.store.requeue(collection, id).await?;
        if requeued {
            tracing::info!("Requeued {} record {}", collection, id);
        }
        Ok(requeued)
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs a drain on every offline → online transition until the handle is removed.
///
/// The watch channel keeps only the latest value, so a quick flap may be
/// observed as online → online. Any change that lands on online drains; the
/// in-flight guard absorbs the redundant ones.
pub fn spawn_auto_sync(coordinator: Arc<SyncCoordinator>) -> ListenerHandle {
    let mut rx = coordinator.connectivity().subscribe();
    // Changes after this call are seen even if the task has not started yet.
    rx.mark_unchanged();

    let task = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online {
                tracing::info!("Connectivity restored, draining pending records");
                coordinator.sync_pending_data().await;
            }
        }
    });

    ListenerHandle::new(task)
}
