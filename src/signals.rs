//! Engine signal stream
//!
//! Cross-cutting notification stream for the persistence engine, implemented
//! as an observer registry rather than an event-emitter base class. Error
//! signals carry the error object; `Write` carries no payload. Per-operation
//! outcomes travel as `Result` values instead.

use crate::error::StorageError;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Signals emitted by the engine over its lifetime.
#[derive(Debug, Clone)]
pub enum EngineSignal {
    /// Bootstrap finished. Fires exactly once per engine instance, carrying
    /// the initial read error if one occurred (a read error does not prevent
    /// readiness).
    Ready { error: Option<Arc<StorageError>> },
    /// I/O failure reading the backing store.
    ReadError(Arc<StorageError>),
    /// Directory/file creation failure that survived the existence re-check.
    CreateError(Arc<StorageError>),
    /// I/O failure writing a snapshot.
    WriteError(Arc<StorageError>),
    /// A snapshot was flushed to the backing store.
    Write,
}

impl EngineSignal {
    /// Stable name used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            EngineSignal::Ready { .. } => "ready",
            EngineSignal::ReadError(_) => "read-error",
            EngineSignal::CreateError(_) => "create-error",
            EngineSignal::WriteError(_) => "write-error",
            EngineSignal::Write => "write",
        }
    }
}

pub type SignalListener = Arc<dyn Fn(&EngineSignal) + Send + Sync>;

/// Token returned by [`SignalHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalToken(u64);

/// Observer registry for [`EngineSignal`]s.
pub struct SignalHub {
    listeners: RwLock<Vec<(u64, SignalListener)>>,
    next_id: AtomicU64,
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, listener: SignalListener) -> SignalToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        SignalToken(id)
    }

    pub fn unsubscribe(&self, token: SignalToken) {
        self.listeners.write().retain(|(id, _)| *id != token.0);
    }

    /// Deliver a signal to every current subscriber.
    pub fn emit(&self, signal: EngineSignal) {
        // Snapshot outside the lock so a listener may subscribe/unsubscribe
        // without deadlocking.
        let listeners: Vec<SignalListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&signal);
        }
    }
}
