//! Remote document collection abstraction.
//!
//! The backend is treated as an eventually-consistent replicated collection
//! of flat JSON documents. Readers hold a standing subscription that yields
//! the full collection every time any document changes; writers add, patch
//! and delete documents by id.
//!
//! Methods return boxed futures and streams so the trait stays
//! dyn-compatible and can be shared as `Arc<dyn DocumentCollection>`.

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use serde_json::Value;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lazy, infinite, non-restartable sequence of full-collection snapshots.
///
/// The first item is the collection as it stands when the subscription is
/// opened. The stream only ends if the backend goes away.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Snapshot> + Send>>;

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// The full contents of a collection at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.iter().any(|d| d.id == id)
    }
}

/// Error type for remote collection operations.
#[derive(Debug)]
pub struct DocumentError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl DocumentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Remote document store shared by every session.
///
/// No method performs authorization; ownership rules are the caller's
/// business.
pub trait DocumentCollection: Send + Sync {
    /// Opens a standing subscription on the collection at `path`.
    fn subscribe(&self, path: &str) -> SnapshotStream;

    /// Stores a new document and returns the id the backend assigned to it.
    fn add_document(
        &self,
        path: &str,
        fields: Value,
    ) -> BoxFuture<'_, Result<String, DocumentError>>;

    /// Merges `patch` into an existing document (last write wins).
    fn update_document(
        &self,
        path: &str,
        id: &str,
        patch: Value,
    ) -> BoxFuture<'_, Result<(), DocumentError>>;

    /// Removes a document. Removing a missing document is not an error.
    fn delete_document(&self, path: &str, id: &str) -> BoxFuture<'_, Result<(), DocumentError>>;
}
