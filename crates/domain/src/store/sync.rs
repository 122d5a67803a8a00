//! Background persistence of store mutations.
//!
//! Every mutation enqueues a [`SyncJob`] carrying the full encoded snapshot
//! and the document operations derived from its events. A single writer task
//! drains the queue: only the newest snapshot in a batch is written, while
//! every job's document operations are mirrored in order. Operations the
//! gateway rejects stay queued and are retried ahead of later ones.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use persistence::{Collection, DocumentGateway, PersistenceError, SnapshotSlot};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::events::StoreEvent;
use crate::state::RestaurantState;

/// Counter document holding the last issued order number.
pub const ORDER_COUNTER: &str = "orderNumber";

/// Document id of the singleton settings record.
pub const SETTINGS_DOCUMENT: &str = "restaurant";

/// Errors reported through a [`SyncHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The local snapshot could not be written.
    #[error("Snapshot write failed: {0}")]
    SnapshotWrite(String),

    /// The document gateway rejected a mirrored operation.
    #[error("Gateway mirror failed: {0}")]
    Mirror(String),

    /// The writer task is gone; the mutation stays in memory only.
    #[error("Sync writer stopped")]
    WriterStopped,
}

/// A document operation mirrored to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MirrorOp {
    Put {
        collection: Collection,
        id: String,
        body: Value,
    },
    Update {
        collection: Collection,
        id: String,
        patch: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
    Clear(Collection),
    IncrementCounter(&'static str),
    ResetCounter(&'static str),
}

impl MirrorOp {
    async fn run(&self, gateway: &dyn DocumentGateway) -> persistence::Result<()> {
        match self {
            MirrorOp::Put {
                collection,
                id,
                body,
            } => gateway.put(*collection, id, body.clone()).await,
            MirrorOp::Update {
                collection,
                id,
                patch,
            } => gateway.update(*collection, id, patch.clone()).await,
            MirrorOp::Delete { collection, id } => gateway.delete(*collection, id).await.map(drop),
            MirrorOp::Clear(collection) => gateway.clear(*collection).await.map(drop),
            MirrorOp::IncrementCounter(name) => gateway.increment_counter(name).await.map(drop),
            MirrorOp::ResetCounter(name) => gateway.reset_counter(name).await,
        }
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(body) => Some(body),
        Err(err) => {
            tracing::warn!(error = %err, "could not serialize document for mirroring");
            None
        }
    }
}

/// Derives gateway operations from applied events. `state` is the state
/// after the events were applied.
pub(crate) fn mirror_ops(events: &[StoreEvent], state: &RestaurantState) -> Vec<MirrorOp> {
    let mut ops = Vec::new();

    for event in events {
        match event {
            StoreEvent::ProductAdded(product) => {
                if let Some(body) = to_body(product) {
                    ops.push(MirrorOp::Put {
                        collection: Collection::Products,
                        id: product.id.to_string(),
                        body,
                    });
                }
            }
            StoreEvent::ProductUpdated { id, .. } => {
                if let Some(body) = state.product(id).and_then(to_body) {
                    ops.push(MirrorOp::Put {
                        collection: Collection::Products,
                        id: id.to_string(),
                        body,
                    });
                }
            }
            StoreEvent::ProductDeleted { id } => ops.push(MirrorOp::Delete {
                collection: Collection::Products,
                id: id.to_string(),
            }),
            StoreEvent::CategoryAdded(category) => {
                if let Some(body) = to_body(category) {
                    ops.push(MirrorOp::Put {
                        collection: Collection::Categories,
                        id: category.id.to_string(),
                        body,
                    });
                }
            }
            StoreEvent::CategoryDeleted { id } => ops.push(MirrorOp::Delete {
                collection: Collection::Categories,
                id: id.to_string(),
            }),
            StoreEvent::OrderPlaced(order) => {
                if let Some(body) = to_body(order) {
                    ops.push(MirrorOp::Put {
                        collection: Collection::Orders,
                        id: order.id.to_string(),
                        body,
                    });
                }
            }
            StoreEvent::OrderNumberAdvanced { .. } => {
                ops.push(MirrorOp::IncrementCounter(ORDER_COUNTER))
            }
            StoreEvent::OrderStatusChanged {
                order_id,
                status,
                at,
            } => ops.push(MirrorOp::Update {
                collection: Collection::Orders,
                id: order_id.to_string(),
                patch: json!({ "status": status, "updatedAt": at }),
            }),
            StoreEvent::OrderHistoryCleared => {
                ops.push(MirrorOp::Clear(Collection::Orders));
                ops.push(MirrorOp::ResetCounter(ORDER_COUNTER));
            }
            StoreEvent::SettingsUpdated(_) => {
                if let Some(body) = to_body(state.settings()) {
                    ops.push(MirrorOp::Put {
                        collection: Collection::Settings,
                        id: SETTINGS_DOCUMENT.to_string(),
                        body,
                    });
                }
            }
            // Cart and admin session state are local only
            StoreEvent::CartItemAdded { .. }
            | StoreEvent::CartItemQuantitySet { .. }
            | StoreEvent::CartItemRemoved { .. }
            | StoreEvent::CartCleared
            | StoreEvent::AdminProfileCached(_)
            | StoreEvent::AuthenticationChanged { .. } => {}
        }
    }

    ops
}

struct SyncJob {
    revision: u64,
    snapshot: String,
    mirror: Vec<MirrorOp>,
    done: oneshot::Sender<Result<(), SyncError>>,
}

/// Pending persistence of one mutation.
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct SyncHandle {
    revision: u64,
    receiver: Option<oneshot::Receiver<Result<(), SyncError>>>,
}

impl SyncHandle {
    /// A handle for a mutation that produced nothing to persist.
    pub(crate) fn ready(revision: u64) -> Self {
        Self {
            revision,
            receiver: None,
        }
    }

    /// The store revision this handle tracks.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Waits until the mutation is persisted (or persisting it failed).
    pub async fn wait(self) -> Result<(), SyncError> {
        match self.receiver {
            None => Ok(()),
            Some(receiver) => receiver.await.unwrap_or(Err(SyncError::WriterStopped)),
        }
    }
}

#[derive(Debug, Default)]
struct SyncStatus {
    applied: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicBool,
}

/// Owns the queue to the writer task and tracks what has been persisted.
#[derive(Debug)]
pub(crate) struct SyncWriter {
    sender: mpsc::UnboundedSender<SyncJob>,
    status: Arc<SyncStatus>,
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("revision", &self.revision)
            .field("mirror", &self.mirror.len())
            .finish()
    }
}

impl SyncWriter {
    /// Spawns the writer task on the current runtime.
    pub(crate) fn spawn(
        slot: Arc<dyn SnapshotSlot>,
        gateway: Option<Arc<dyn DocumentGateway>>,
        debounce: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let status = Arc::new(SyncStatus::default());

        tokio::spawn(run_writer(
            receiver,
            slot,
            gateway,
            debounce,
            Arc::clone(&status),
        ));

        Self { sender, status }
    }

    /// The latest revision handed to the writer.
    pub(crate) fn revision(&self) -> u64 {
        self.status.applied.load(Ordering::SeqCst)
    }

    /// Queues a write. Must be called while holding the state write lock so
    /// revisions follow mutation order.
    pub(crate) fn enqueue(&self, snapshot: String, mirror: Vec<MirrorOp>) -> SyncHandle {
        let revision = self.status.applied.fetch_add(1, Ordering::SeqCst) + 1;
        let (done, receiver) = oneshot::channel();

        let job = SyncJob {
            revision,
            snapshot,
            mirror,
            done,
        };
        if let Err(mpsc::error::SendError(job)) = self.sender.send(job) {
            tracing::error!(revision, "sync writer stopped; mutation kept in memory only");
            self.status.failed.store(true, Ordering::SeqCst);
            let _ = job.done.send(Err(SyncError::WriterStopped));
        }

        SyncHandle {
            revision,
            receiver: Some(receiver),
        }
    }

    /// Records a mutation that could not be queued at all.
    pub(crate) fn reject(&self, error: SyncError) -> SyncHandle {
        let revision = self.status.applied.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.failed.store(true, Ordering::SeqCst);

        let (done, receiver) = oneshot::channel();
        let _ = done.send(Err(error));
        SyncHandle {
            revision,
            receiver: Some(receiver),
        }
    }

    /// True while some applied mutation is not yet persisted, the last
    /// snapshot write failed, or gateway operations are still queued.
    pub(crate) fn is_dirty(&self) -> bool {
        self.status.failed.load(Ordering::SeqCst)
            || self.status.persisted.load(Ordering::SeqCst)
                < self.status.applied.load(Ordering::SeqCst)
    }
}

async fn run_writer(
    mut receiver: mpsc::UnboundedReceiver<SyncJob>,
    slot: Arc<dyn SnapshotSlot>,
    gateway: Option<Arc<dyn DocumentGateway>>,
    debounce: Duration,
    status: Arc<SyncStatus>,
) {
    let mut unmirrored = VecDeque::new();

    while let Some(first) = receiver.recv().await {
        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let mut batch = vec![first];
        while let Ok(job) = receiver.try_recv() {
            batch.push(job);
        }

        write_batch(
            batch,
            slot.as_ref(),
            gateway.as_deref(),
            &mut unmirrored,
            &status,
        )
        .await;
    }

    tracing::debug!("sync writer shutting down");
}

#[tracing::instrument(skip_all, fields(jobs = batch.len()))]
async fn write_batch(
    batch: Vec<SyncJob>,
    slot: &dyn SnapshotSlot,
    gateway: Option<&dyn DocumentGateway>,
    unmirrored: &mut VecDeque<MirrorOp>,
    status: &SyncStatus,
) {
    let Some(latest) = batch.last() else {
        return;
    };
    let revision = latest.revision;

    let started = Instant::now();
    let snapshot_result = match slot.save(&latest.snapshot).await {
        Ok(()) => {
            metrics::counter!("snapshot_writes_total").increment(1);
            metrics::histogram!("snapshot_write_duration_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::debug!(revision, bytes = latest.snapshot.len(), "snapshot written");
            Ok(())
        }
        Err(err) => {
            metrics::counter!("snapshot_write_failures_total").increment(1);
            tracing::error!(revision, error = %err, "snapshot write failed");
            Err(SyncError::SnapshotWrite(err.to_string()))
        }
    };

    // Once the gateway stalls, later jobs only queue their operations
    let mut stalled: Option<SyncError> = None;
    let mut results = Vec::with_capacity(batch.len());
    for job in batch {
        let mut result = snapshot_result.clone();

        if let Some(gateway) = gateway {
            unmirrored.extend(job.mirror);
            let mirrored = match &stalled {
                Some(err) => Err(err.clone()),
                None => drain_unmirrored(gateway, unmirrored).await,
            };
            if let Err(err) = mirrored {
                if !unmirrored.is_empty() {
                    stalled = Some(err.clone());
                }
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        results.push((job.done, result));
    }

    metrics::gauge!("gateway_mirror_pending").set(unmirrored.len() as f64);

    // Status is settled before any waiter wakes up
    let settled = snapshot_result.is_ok() && unmirrored.is_empty();
    status.failed.store(!settled, Ordering::SeqCst);
    if settled {
        status.persisted.fetch_max(revision, Ordering::SeqCst);
    }

    for (done, result) in results {
        // The caller may have dropped its handle
        let _ = done.send(result);
    }
}

/// Runs queued operations in order. A rejected operation stays at the front
/// of the queue; one whose target document is gone is dropped, as retrying
/// it cannot succeed.
async fn drain_unmirrored(
    gateway: &dyn DocumentGateway,
    unmirrored: &mut VecDeque<MirrorOp>,
) -> Result<(), SyncError> {
    let mut outcome = Ok(());

    while let Some(op) = unmirrored.front() {
        match op.run(gateway).await {
            Ok(()) => {}
            Err(err @ PersistenceError::NotFound { .. }) => {
                metrics::counter!("gateway_mirror_failures_total").increment(1);
                tracing::warn!(?op, error = %err, "mirror target missing, dropping operation");
                if outcome.is_ok() {
                    outcome = Err(SyncError::Mirror(err.to_string()));
                }
            }
            Err(err) => {
                metrics::counter!("gateway_mirror_failures_total").increment(1);
                tracing::warn!(?op, pending = unmirrored.len(), error = %err, "gateway mirror failed");
                return Err(SyncError::Mirror(err.to_string()));
            }
        }
        unmirrored.pop_front();
    }

    outcome
}
