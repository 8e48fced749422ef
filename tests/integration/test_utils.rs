//! Shared test utilities for integration tests
//!
//! Provides a gate-controlled storage backend so tests can hold a read or
//! write in flight deterministically, plus helpers for observing the engine
//! signal stream.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use statemirror::backend::StorageBackend;
use statemirror::error::StorageError;
use statemirror::signals::EngineSignal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;

/// Backend whose read and write block until a permit is released.
///
/// Each operation sends on its `*_started` channel on entry, then waits for
/// one permit on its gate before completing.
pub struct GatedBackend {
    read_data: Mutex<Option<Value>>,
    read_started: UnboundedSender<()>,
    read_gate: Arc<Semaphore>,
    writes: Mutex<Vec<Value>>,
    write_started: UnboundedSender<()>,
    write_gate: Arc<Semaphore>,
}

pub struct Gates {
    pub read_started: UnboundedReceiver<()>,
    pub read_gate: Arc<Semaphore>,
    pub write_started: UnboundedReceiver<()>,
    pub write_gate: Arc<Semaphore>,
}

impl GatedBackend {
    pub fn new(read_data: Option<Value>) -> (Arc<Self>, Gates) {
        let (read_tx, read_rx) = unbounded_channel();
        let (write_tx, write_rx) = unbounded_channel();
        let read_gate = Arc::new(Semaphore::new(0));
        let write_gate = Arc::new(Semaphore::new(0));

        let backend = Arc::new(Self {
            read_data: Mutex::new(read_data),
            read_started: read_tx,
            read_gate: Arc::clone(&read_gate),
            writes: Mutex::new(Vec::new()),
            write_started: write_tx,
            write_gate: Arc::clone(&write_gate),
        });
        let gates = Gates {
            read_started: read_rx,
            read_gate,
            write_started: write_rx,
            write_gate,
        };
        (backend, gates)
    }

    pub fn written(&self) -> Vec<Value> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl StorageBackend for GatedBackend {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn read(&self, _filter: Option<&Value>) -> Result<Option<Value>, StorageError> {
        let _ = self.read_started.send(());
        self.read_gate
            .acquire()
            .await
            .expect("read gate closed")
            .forget();
        Ok(self.read_data.lock().take())
    }

    async fn write(&self, snapshot: &Value) -> Result<(), StorageError> {
        let _ = self.write_started.send(());
        self.write_gate
            .acquire()
            .await
            .expect("write gate closed")
            .forget();
        self.writes.lock().push(snapshot.clone());
        Ok(())
    }
}

/// Signal listener and receiver pair for asserting on the signal stream.
pub fn signal_channel() -> (
    impl Fn(&EngineSignal) + Send + Sync + 'static,
    UnboundedReceiver<String>,
) {
    let (tx, rx) = unbounded_channel();
    (
        move |signal: &EngineSignal| {
            let _ = tx.send(signal.name().to_string());
        },
        rx,
    )
}

/// Receive the next event or panic after five seconds.
pub async fn next_event<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

/// Poll until `predicate` holds, panicking after five seconds.
pub async fn wait_until<F: Fn() -> bool>(predicate: F) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached before timeout");
}
