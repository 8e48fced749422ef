//! Sled storage backend
//!
//! Embedded-database variant of [`StorageBackend`]. The full snapshot is
//! stored JSON-encoded under a single fixed key; the engine drives it exactly
//! like the file variant, which is the point of the capability seam.

use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::state::Snapshot;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

const SNAPSHOT_KEY: &[u8] = b"snapshot";

pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    /// Open (or create) a sled database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)
            .map_err(|e| StorageError::Backend(format!("failed to open sled database: {}", e)))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        // Opening the database created the target; nothing left to do.
        Ok(())
    }

    async fn read(&self, _filter: Option<&Snapshot>) -> Result<Option<Snapshot>, StorageError> {
        let bytes = self
            .db
            .get(SNAPSHOT_KEY)
            .map_err(|e| StorageError::Backend(format!("failed to read snapshot: {}", e)))?;

        let bytes = match bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Ok(None),
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(error = %err, "stored snapshot failed to parse, delivering empty tree");
                Ok(Some(Value::Object(Map::new())))
            }
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(snapshot).map_err(StorageError::Serialization)?;
        self.db
            .insert(SNAPSHOT_KEY, bytes)
            .map_err(|e| StorageError::Backend(format!("failed to store snapshot: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to flush database: {}", e)))?;
        Ok(())
    }
}
