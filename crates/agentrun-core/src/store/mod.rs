//! Access to the persistent resource store.
//!
//! [`Store`] is the single seam to the control plane: objects travel as JSON documents keyed by
//! kind, namespace and name. [`Api`] layers typed, namespaced access on top of it.

mod api;
pub use api::Api;

mod memory;
pub use memory::MemoryStore;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use agentrun_model::OwnerReference;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The write was based on a stale resource version.
    #[error("conflict on {0}: object was modified")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Errors that may succeed when the same operation is retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Namespaced object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Applied,
    Deleted,
}

/// Change notification emitted after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: String,
    pub key: ObjectKey,
    pub op: WatchOp,
    pub owners: Vec<OwnerReference>,
}

/// Persistent store with optimistic concurrency and owner-based cascading deletion.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn get(&self, kind: &str, key: &ObjectKey) -> Result<Option<Value>, StoreError>;

    /// All objects of `kind`, optionally restricted to one namespace.
    async fn list(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] when the name is taken.
    async fn create(&self, kind: &str, object: Value) -> Result<Value, StoreError>;

    /// Compare-and-swap on `metadata.resourceVersion`.
    ///
    /// Fails with [`StoreError::Conflict`] when the stored version differs.
    async fn replace(&self, kind: &str, object: Value) -> Result<Value, StoreError>;

    /// Deletes the object and, transitively, every object it owns.
    async fn delete(&self, kind: &str, key: &ObjectKey) -> Result<(), StoreError>;

    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
