//! Shared state contract
//!
//! The engine persists an externally-owned mutable data tree. This module
//! defines the capability contract the engine consumes (`SharedState`) and a
//! minimal in-memory reference implementation (`MemoryTree`) used by the CLI
//! and by tests. The tree's own merge/diff semantics stay outside the engine.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The full data tree as observed at one instant: nested mappings, sequences
/// and primitives. Always re-read fresh at the moment a write executes.
pub type Snapshot = Value;

/// Change notification callback. Fires after any mutation.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`SharedState::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Capability contract of the externally-owned mutable data tree.
///
/// The engine only ever consumes this contract; it never constructs or owns
/// the tree itself.
pub trait SharedState: Send + Sync {
    /// Current full tree, synchronous.
    fn snapshot(&self) -> Snapshot;

    /// Replace the subtree at `path_prefix` (root = `""`) with `data`.
    fn replace(&self, data: Snapshot, path_prefix: &str);

    /// Register a change listener; fires after any mutation.
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

    /// Remove a previously registered listener.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-memory reference implementation of [`SharedState`].
///
/// Paths are dot-separated object keys (`"server.port"`); intermediate
/// objects are created on demand.
pub struct MemoryTree {
    root: RwLock<Value>,
    listeners: RwLock<HashMap<u64, ChangeListener>>,
    next_id: AtomicU64,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::with_value(Value::Object(Map::new()))
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            root: RwLock::new(value),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set the value at a dot-separated path, creating intermediate objects
    /// as needed, then notify listeners.
    pub fn set(&self, path: &str, value: Value) {
        {
            let mut root = self.root.write();
            if path.is_empty() {
                *root = value;
            } else {
                set_at_path(&mut root, path, value);
            }
        }
        self.notify();
    }

    /// Remove the value at a dot-separated path. Returns the removed value,
    /// notifying listeners only when something was actually removed.
    pub fn remove(&self, path: &str) -> Option<Value> {
        let removed = {
            let mut root = self.root.write();
            remove_at_path(&mut root, path)
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Read the value at a dot-separated path (`""` = whole tree).
    pub fn get(&self, path: &str) -> Option<Value> {
        let root = self.root.read();
        if path.is_empty() {
            return Some(root.clone());
        }
        let mut current = &*root;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    fn notify(&self) {
        // Listeners are invoked outside the lock so a listener may
        // subscribe/unsubscribe without deadlocking.
        let listeners: Vec<ChangeListener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl SharedState for MemoryTree {
    fn snapshot(&self) -> Snapshot {
        self.root.read().clone()
    }

    fn replace(&self, data: Snapshot, path_prefix: &str) {
        self.set(path_prefix, data);
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, listener);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners.write().remove(&id.0);
    }
}

fn set_at_path(root: &mut Value, path: &str, value: Value) {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().unwrap();
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn remove_at_path(root: &mut Value, path: &str) -> Option<Value> {
    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let map = current.as_object_mut()?;
        if i == segments.len() - 1 {
            return map.remove(*segment);
        }
        current = map.get_mut(*segment)?;
    }
    None
}
