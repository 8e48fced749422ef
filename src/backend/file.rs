//! File storage backend
//!
//! Persists the tree as UTF-8 JSON text in a single file, compact or
//! pretty-printed. Every write is a full overwrite of the target's content;
//! there are no partial or patch writes.

use crate::backend::StorageBackend;
use crate::bootstrap::FsBootstrapper;
use crate::error::StorageError;
use crate::state::Snapshot;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

pub struct FileBackend {
    bootstrapper: FsBootstrapper,
    pretty_print: bool,
}

impl FileBackend {
    pub fn new<P: Into<std::path::PathBuf>>(path: P) -> Self {
        Self {
            bootstrapper: FsBootstrapper::new(path),
            pretty_print: false,
        }
    }

    /// Write indented JSON instead of compact.
    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    pub fn path(&self) -> &Path {
        self.bootstrapper.target()
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        self.bootstrapper.ensure_target()
    }

    async fn read(&self, filter: Option<&Snapshot>) -> Result<Option<Snapshot>, StorageError> {
        if let Some(filter) = filter {
            // The file variant stores one opaque blob; filters only apply to
            // item-granular backends.
            debug!(?filter, "read filter ignored by file backend");
        }

        let content = match tokio::fs::read_to_string(self.path()).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                // Malformed content is a distinct, non-propagated class from
                // I/O failure: log it and start from an empty tree.
                warn!(
                    path = %self.path().display(),
                    error = %err,
                    "stored content failed to parse, delivering empty tree"
                );
                Ok(Some(Value::Object(Map::new())))
            }
        }
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let bytes = if self.pretty_print {
            serde_json::to_vec_pretty(snapshot)
        } else {
            serde_json::to_vec(snapshot)
        }
        .map_err(StorageError::Serialization)?;

        tokio::fs::write(self.path(), bytes)
            .await
            .map_err(StorageError::Io)?;
        debug!(path = %self.path().display(), "snapshot flushed");
        Ok(())
    }
}
