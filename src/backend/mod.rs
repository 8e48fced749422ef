//! Storage backends
//!
//! Byte-level read/write against a storage target behind a polymorphic
//! capability trait. Variants are selected by injecting an implementation
//! value into the engine, not by subclassing; the engine never needs to know
//! which variant it is driving.

use crate::error::StorageError;
use crate::state::Snapshot;
use async_trait::async_trait;

mod file;
mod sled_store;

pub use file::FileBackend;
pub use sled_store::SledBackend;

/// Backend capability consumed by the persistence engine.
///
/// `persist_items` and `unpersist_item` are declared for backends with
/// item-granular storage (databases, object stores). A backend that does not
/// support them must signal [`StorageError::NotImplemented`] rather than
/// silently no-op, which is what the default implementations do.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Ensure the storage target exists. Invoked lazily by the engine before
    /// the bootstrap read and before writes until it first succeeds; failures
    /// surface as `create-error` and the operation proceeds regardless.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Read the stored tree.
    ///
    /// `Ok(None)` means the store holds no data (missing or empty target);
    /// malformed content is downgraded to an empty tree and logged, never
    /// surfaced as an error. `Err` is reserved for genuine I/O failure.
    async fn read(&self, filter: Option<&Snapshot>) -> Result<Option<Snapshot>, StorageError>;

    /// Persist a full snapshot, overwriting any previous content.
    async fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError>;

    /// Read items matching `filter` from the store into the shared state.
    async fn persist_items(&self, _filter: Option<&Snapshot>) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("persist_items"))
    }

    /// Remove a single item from the store by key.
    async fn unpersist_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("unpersist_item"))
    }
}
