//! Error types for the statemirror persistence engine.

use thiserror::Error;

/// Storage-related errors
///
/// Parse failures of stored content are deliberately *not* represented here:
/// the backends downgrade malformed content to an empty tree and log it, so a
/// corrupt store never aborts the engine.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Failed to encode snapshot: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Operation not implemented by this backend: {0}")]
    NotImplemented(&'static str),
}

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The one fatal, non-event error: raised directly at construction when a
    /// required collaborator is missing, since no signal routing is wired yet.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Engine has been unpersisted and is permanently inert")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
