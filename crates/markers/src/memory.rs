//! In-process document collection.
//!
//! Every write fans the full collection out to all subscribers through a
//! broadcast channel. A subscriber that falls behind loses the oldest
//! snapshots and resumes at the oldest one still buffered. Each snapshot is
//! complete, so the ones that follow bring it up to date.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::remote::{
    BoxFuture, Document, DocumentCollection, DocumentError, Snapshot, SnapshotStream,
};

const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

struct Collection {
    documents: Vec<Document>,
    broadcaster: broadcast::Sender<Snapshot>,
}

impl Collection {
    fn new() -> Self {
        let (broadcaster, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);
        Self {
            documents: Vec::new(),
            broadcaster,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.documents.clone())
    }

    fn publish(&self) {
        // Ignore send errors (no subscribers)
        let _ = self.broadcaster.send(self.snapshot());
    }
}

/// Document collections kept in memory, keyed by collection path.
pub struct MemoryCollection {
    collections: Mutex<HashMap<String, Collection>>,
    fail_writes: AtomicBool,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail as an unreachable backend would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn documents(&self, path: &str) -> Vec<Document> {
        self.collections
            .lock()
            .get(path)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    fn check_writable(&self) -> Result<(), DocumentError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DocumentError::new("backend unavailable"));
        }
        Ok(())
    }

    fn add(&self, path: &str, fields: Value) -> Result<String, DocumentError> {
        self.check_writable()?;
        if !fields.is_object() {
            return Err(DocumentError::new("document fields must be a JSON object"));
        }

        let id = Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.lock();
        let collection = collections
            .entry(path.to_string())
            .or_insert_with(Collection::new);
        collection.documents.push(Document::new(id.clone(), fields));
        collection.publish();
        debug!("added document {id} to {path}");
        Ok(id)
    }

    fn update(&self, path: &str, id: &str, patch: Value) -> Result<(), DocumentError> {
        self.check_writable()?;
        let Value::Object(patch) = patch else {
            return Err(DocumentError::new("patch must be a JSON object"));
        };

        let mut collections = self.collections.lock();
        let doc = collections
            .get_mut(path)
            .and_then(|c| c.documents.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| DocumentError::new(format!("no document to update: {path}/{id}")))?;

        match &mut doc.fields {
            Value::Object(fields) => {
                for (k, v) in patch {
                    fields.insert(k, v);
                }
            }
            other => *other = Value::Object(patch),
        }

        if let Some(c) = collections.get(path) {
            c.publish();
        }
        debug!("updated document {path}/{id}");
        Ok(())
    }

    fn delete(&self, path: &str, id: &str) -> Result<(), DocumentError> {
        self.check_writable()?;
        let mut collections = self.collections.lock();
        let Some(collection) = collections.get_mut(path) else {
            return Ok(());
        };
        let before = collection.documents.len();
        collection.documents.retain(|d| d.id != id);
        if collection.documents.len() != before {
            collection.publish();
            debug!("deleted document {path}/{id}");
        }
        Ok(())
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentCollection for MemoryCollection {
    fn subscribe(&self, path: &str) -> SnapshotStream {
        // Take the current contents and the receiver under one lock so no
        // write can slip between them.
        let (current, rx) = {
            let mut collections = self.collections.lock();
            let collection = collections
                .entry(path.to_string())
                .or_insert_with(Collection::new);
            (collection.snapshot(), collection.broadcaster.subscribe())
        };

        let updates = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(snapshot) => return Some((snapshot, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("snapshot subscriber dropped {skipped} oldest snapshots");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Box::pin(stream::once(async move { current }).chain(updates))
    }

    fn add_document(
        &self,
        path: &str,
        fields: Value,
    ) -> BoxFuture<'_, Result<String, DocumentError>> {
        let path = path.to_string();
        Box::pin(async move { self.add(&path, fields) })
    }

    fn update_document(
        &self,
        path: &str,
        id: &str,
        patch: Value,
    ) -> BoxFuture<'_, Result<(), DocumentError>> {
        let path = path.to_string();
        let id = id.to_string();
        Box::pin(async move { self.update(&path, &id, patch) })
    }

    fn delete_document(&self, path: &str, id: &str) -> BoxFuture<'_, Result<(), DocumentError>> {
        let path = path.to_string();
        let id = id.to_string();
        Box::pin(async move { self.delete(&path, &id) })
    }
}
