//! Storage bootstrap and backend-variant integration tests.

use super::test_utils::{next_event, signal_channel, wait_until};
use serde_json::json;
use statemirror::backend::{FileBackend, SledBackend, StorageBackend};
use statemirror::config::PersistenceConfig;
use statemirror::engine::PersistenceEngine;
use statemirror::state::{MemoryTree, SharedState};
use std::sync::Arc;
use tempfile::TempDir;

fn no_read_config() -> PersistenceConfig {
    PersistenceConfig {
        write_delay_ms: 0,
        invoke_initial_read: false,
        ..PersistenceConfig::default()
    }
}

#[tokio::test]
async fn flush_creates_missing_directories_lazily() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("nested").join("deeper").join("store.json");

    let tree = Arc::new(MemoryTree::new());
    let engine = PersistenceEngine::builder()
        .shared_state(Arc::clone(&tree) as Arc<dyn SharedState>)
        .backend(Arc::new(FileBackend::new(&store)) as Arc<dyn StorageBackend>)
        .config(no_read_config())
        .start()
        .await
        .unwrap();

    // Nothing is created until the first flush actually needs the target.
    assert!(!store.exists());
    tree.set("a", json!(1));
    wait_until(|| {
        std::fs::read_to_string(&store)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            == Some(json!({ "a": 1 }))
    })
    .await;
    engine.unpersist();
}

#[tokio::test]
async fn create_failure_routes_create_error_and_flow_continues() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let store = blocker.join("store.json");

    let tree = Arc::new(MemoryTree::new());
    let (listener, mut signals) = signal_channel();

    let engine = PersistenceEngine::builder()
        .shared_state(Arc::clone(&tree) as Arc<dyn SharedState>)
        .backend(Arc::new(FileBackend::new(&store)) as Arc<dyn StorageBackend>)
        .config(no_read_config())
        .on_signal(listener)
        .start()
        .await
        .unwrap();
    assert_eq!(next_event(&mut signals).await, "ready");

    tree.set("a", json!(1));
    // Bootstrap failure is non-fatal; the write proceeds and fails
    // downstream on its own terms.
    assert_eq!(next_event(&mut signals).await, "create-error");
    assert_eq!(next_event(&mut signals).await, "write-error");
    assert!(engine.is_enabled());
    engine.unpersist();
}

#[tokio::test]
async fn write_error_does_not_stop_subsequent_flushes() {
    let temp_dir = TempDir::new().unwrap();
    let store = temp_dir.path().join("store.json");
    // A directory at the target makes writes fail until it is removed.
    std::fs::create_dir(&store).unwrap();

    let tree = Arc::new(MemoryTree::new());
    let (listener, mut signals) = signal_channel();

    let engine = PersistenceEngine::builder()
        .shared_state(Arc::clone(&tree) as Arc<dyn SharedState>)
        .backend(Arc::new(FileBackend::new(&store)) as Arc<dyn StorageBackend>)
        .config(no_read_config())
        .on_signal(listener)
        .start()
        .await
        .unwrap();
    assert_eq!(next_event(&mut signals).await, "ready");

    tree.set("a", json!(1));
    assert_eq!(next_event(&mut signals).await, "write-error");

    // The engine keeps running and flushes the next coalesced write once
    // the target becomes writable.
    std::fs::remove_dir(&store).unwrap();
    tree.set("a", json!(2));
    assert_eq!(next_event(&mut signals).await, "write");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&std::fs::read_to_string(&store).unwrap())
            .unwrap(),
        json!({ "a": 2 })
    );
    engine.unpersist();
}

#[tokio::test]
async fn sled_backend_drives_identically_through_the_engine() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(SledBackend::new(temp_dir.path().join("db")).unwrap());

    let tree = Arc::new(MemoryTree::new());
    let (listener, mut signals) = signal_channel();

    let engine = PersistenceEngine::builder()
        .shared_state(Arc::clone(&tree) as Arc<dyn SharedState>)
        .backend(Arc::clone(&backend) as Arc<dyn StorageBackend>)
        .config(PersistenceConfig {
            write_delay_ms: 0,
            ..PersistenceConfig::default()
        })
        .on_signal(listener)
        .start()
        .await
        .unwrap();
    assert_eq!(next_event(&mut signals).await, "ready");

    tree.set("a", json!(1));
    assert_eq!(next_event(&mut signals).await, "write");
    assert_eq!(backend.read(None).await.unwrap(), Some(json!({ "a": 1 })));
    engine.unpersist();
}
