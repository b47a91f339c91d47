//! Local mirror of the remote marker collection.
//!
//! The mirror is replaced wholesale by every snapshot; there is no
//! incremental diffing. Writes go to the remote collection first and only
//! touch the mirror once the backend accepted them, so a failed write leaves
//! local state as it was.
//!
//! Ordering contract:
//! - Markers are kept in snapshot order, i.e. the order the backend lists them.
//! - A marker created locally is appended after the remote call succeeds and
//!   stays *pending* until a snapshot contains its id. Pending markers missing
//!   from a snapshot (one emitted before the write landed) are re-appended
//!   after the snapshot contents. A caller's own create may therefore be
//!   observed through the subscription before or after `create` returns
//!   without duplicating or dropping it.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};

use foundation::ids::MarkerId;
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, alerts_from};
use crate::marker::{Marker, MarkerInput, MarkerPatch};
use crate::remote::{DocumentCollection, DocumentError, Snapshot};

#[derive(Debug)]
pub enum StoreError {
    Remote(DocumentError),
    Encode(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Remote(e) => write!(f, "remote write failed: {e}"),
            StoreError::Encode(e) => write!(f, "could not encode marker: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Remote(e) => Some(e),
            StoreError::Encode(e) => Some(e),
        }
    }
}

/// What one snapshot did to the mirror.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Markers in the mirror after the snapshot.
    pub markers: usize,
    /// Records that could not be decoded and were left out.
    pub skipped: usize,
    /// Locally created markers kept although the snapshot did not list them yet.
    pub pending: usize,
}

/// Most recent ids listed by any snapshot, oldest evicted first.
const SEEN_ID_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    fn insert(&mut self, id: &str) {
        if self.ids.insert(id.to_string()) {
            self.order.push_back(id.to_string());
        }
        while self.order.len() > SEEN_ID_CAPACITY {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[derive(Debug, Default)]
struct Mirror {
    markers: Vec<Marker>,
    pending: Vec<MarkerId>,
    seen: SeenIds,
}

impl Mirror {
    fn contains(&self, id: &MarkerId) -> bool {
        self.markers.iter().any(|m| &m.id == id)
    }

    /// Whether a create that returned `id` still needs appending. An id a
    /// snapshot already listed is either in the mirror or was deleted since.
    fn needs_append(&self, id: &MarkerId) -> bool {
        !self.contains(id) && !self.seen.contains(id.as_str())
    }

    fn replace(&mut self, snapshot: &Snapshot) -> SnapshotSummary {
        let mut markers = Vec::with_capacity(snapshot.len() + self.pending.len());
        let mut skipped = 0usize;
        for doc in &snapshot.documents {
            self.seen.insert(&doc.id);
            match Marker::from_document(doc) {
                Ok(m) => markers.push(m),
                Err(e) => {
                    warn!("skipping marker record {}: {e}", doc.id);
                    skipped += 1;
                }
            }
        }

        // Confirmed once any snapshot lists the id (even if it failed to decode).
        self.pending.retain(|id| !snapshot.contains(id.as_str()));

        let previous = std::mem::take(&mut self.markers);
        let mut kept = 0usize;
        for id in &self.pending {
            if let Some(m) = previous.iter().find(|m| &m.id == id) {
                markers.push(m.clone());
                kept += 1;
            }
        }
        self.pending.retain(|id| markers.iter().any(|m| &m.id == id));
        self.markers = markers;

        SnapshotSummary {
            markers: self.markers.len(),
            skipped,
            pending: kept,
        }
    }
}

struct Shared {
    mirror: RwLock<Mirror>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

/// Handle to the background subscription task. Dropping it stops the sync.
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Marker collection mirror with write-through operations.
#[derive(Clone)]
pub struct MarkerStore {
    remote: Arc<dyn DocumentCollection>,
    path: String,
    shared: Arc<Shared>,
}

impl MarkerStore {
    pub fn new(remote: Arc<dyn DocumentCollection>, path: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            remote,
            path: path.into(),
            shared: Arc::new(Shared {
                mirror: RwLock::new(Mirror::default()),
                revision,
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current markers in mirror order.
    pub fn markers(&self) -> Vec<Marker> {
        self.shared.mirror.read().markers.clone()
    }

    pub fn get(&self, id: &MarkerId) -> Option<Marker> {
        self.shared
            .mirror
            .read()
            .markers
            .iter()
            .find(|m| &m.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.mirror.read().markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Markers projected for the alerts view, newest first.
    pub fn alerts(&self) -> Vec<Alert> {
        alerts_from(&self.shared.mirror.read().markers)
    }

    /// Revision counter bumped on every mirror change, for re-rendering.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Replaces the mirror with `snapshot`.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> SnapshotSummary {
        let summary = self.shared.mirror.write().replace(snapshot);
        self.shared.bump();
        summary
    }

    /// Opens the standing subscription and mirrors it on a background task.
    ///
    /// The task only holds a weak reference to the mirror: once every
    /// `MarkerStore` clone is dropped, late snapshots are discarded and the
    /// task exits.
    pub fn spawn_sync(&self) -> SyncHandle {
        let mut snapshots = self.remote.subscribe(&self.path);
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let path = self.path.clone();

        let task = tokio::spawn(async move {
            while let Some(snapshot) = snapshots.next().await {
                let Some(shared) = shared.upgrade() else {
                    debug!("marker store for {path} dropped; discarding snapshot");
                    break;
                };
                let summary = shared.mirror.write().replace(&snapshot);
                shared.bump();
                debug!(
                    "applied {path} snapshot: markers={} skipped={} pending={}",
                    summary.markers, summary.skipped, summary.pending
                );
            }
            debug!("marker subscription for {path} ended");
        });

        SyncHandle { task }
    }

    /// Persists a new marker and returns the id the backend assigned.
    pub async fn create(&self, input: MarkerInput) -> Result<MarkerId, StoreError> {
        let fields = input.to_fields().map_err(StoreError::Encode)?;
        let id = self
            .remote
            .add_document(&self.path, fields)
            .await
            .map_err(|e| {
                warn!("marker create failed: {e}");
                StoreError::Remote(e)
            })?;
        let id = MarkerId::new(id);

        {
            let mut mirror = self.shared.mirror.write();
            if mirror.needs_append(&id) {
                mirror.markers.push(input.into_marker(id.clone()));
                mirror.pending.push(id.clone());
            }
        }
        self.shared.bump();
        info!("created marker {id}");
        Ok(id)
    }

    /// Merges `patch` into the remote record. No version check: last write wins.
    pub async fn update(&self, id: &MarkerId, patch: MarkerPatch) -> Result<(), StoreError> {
        let fields = patch.to_fields().map_err(StoreError::Encode)?;
        self.remote
            .update_document(&self.path, id.as_str(), fields)
            .await
            .map_err(|e| {
                warn!("marker update failed for {id}: {e}");
                StoreError::Remote(e)
            })?;

        {
            let mut mirror = self.shared.mirror.write();
            if let Some(m) = mirror.markers.iter_mut().find(|m| &m.id == id) {
                m.apply(&patch);
            }
        }
        self.shared.bump();
        info!("updated marker {id}");
        Ok(())
    }

    /// Removes the remote record. Performs no ownership check.
    pub async fn delete(&self, id: &MarkerId) -> Result<(), StoreError> {
        self.remote
            .delete_document(&self.path, id.as_str())
            .await
            .map_err(|e| {
                warn!("marker delete failed for {id}: {e}");
                StoreError::Remote(e)
            })?;

        {
            let mut mirror = self.shared.mirror.write();
            mirror.markers.retain(|m| &m.id != id);
            mirror.pending.retain(|p| p != id);
        }
        self.shared.bump();
        info!("deleted marker {id}");
        Ok(())
    }
}
