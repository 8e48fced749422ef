//! Persistence engine
//!
//! Orchestrates the lifecycle of mirroring a shared data tree to a storage
//! backend: bootstrap read, merge into shared state, change subscription,
//! and coalesced asynchronous write-back. The engine owns all lifecycle
//! flags and the single error-routing funnel; callers observe non-fatal
//! failures through the signal stream, never through panics.
//!
//! Concurrency model: change notifications may arrive from arbitrary
//! threads. The coalescing flags (`in_write`, `write_wait`), the throttle
//! and the disposer list live behind mutexes, and the actual write I/O runs
//! on a spawned runtime task. At most one write is in flight per engine
//! instance; bursts of notifications during a write collapse into at most
//! one follow-up, which re-samples the freshest state at flush time.

use crate::backend::StorageBackend;
use crate::config::PersistenceConfig;
use crate::error::{EngineError, StorageError};
use crate::signals::{EngineSignal, SignalHub, SignalListener};
use crate::state::{ChangeListener, SharedState, Snapshot};
use crate::throttle::RateLimiter;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, warn};

type Disposer = Box<dyn FnOnce() + Send>;
type ReadyCallback = Box<dyn FnOnce(Option<&StorageError>, ReadyContext) + Send>;

/// Context handed to the ready callback.
pub struct ReadyContext {
    pub shared_state: Arc<dyn SharedState>,
}

/// Signal class used by the error funnel.
enum ErrorSignal {
    Read,
    Create,
    Write,
}

#[derive(Debug, Default)]
struct WriteFlags {
    in_write: bool,
    write_wait: bool,
}

struct EngineInner {
    shared: Arc<dyn SharedState>,
    backend: Arc<dyn StorageBackend>,
    config: PersistenceConfig,
    signals: SignalHub,
    flags: Mutex<WriteFlags>,
    throttle: Option<Mutex<RateLimiter>>,
    disposers: Mutex<Vec<Disposer>>,
    enabled: AtomicBool,
    unpersist_requested: AtomicBool,
    runtime: Handle,
}

impl EngineInner {
    /// Single error-routing funnel: logs the error, emits the named signal
    /// and returns whether the caller may continue its flow.
    fn check_for_error(&self, error: Option<Arc<StorageError>>, class: ErrorSignal) -> bool {
        match error {
            None => true,
            Some(err) => {
                let signal = match class {
                    ErrorSignal::Read => EngineSignal::ReadError(Arc::clone(&err)),
                    ErrorSignal::Create => EngineSignal::CreateError(Arc::clone(&err)),
                    ErrorSignal::Write => EngineSignal::WriteError(Arc::clone(&err)),
                };
                warn!(
                    signal = signal.name(),
                    error = %err,
                    "storage failure routed to signal stream"
                );
                self.signals.emit(signal);
                false
            }
        }
    }

    fn activate_subscription(inner: &Arc<Self>) {
        if inner.unpersist_requested.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(inner);
        let listener: ChangeListener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                EngineInner::notify_change(&inner);
            }
        });
        let token = inner.shared.subscribe(listener);

        let shared = Arc::clone(&inner.shared);
        inner
            .disposers
            .lock()
            .push(Box::new(move || shared.unsubscribe(token)));
        debug!("change subscription active");
    }

    fn notify_change(inner: &Arc<Self>) {
        if inner.unpersist_requested.load(Ordering::SeqCst) {
            return;
        }
        if let Some(throttle) = &inner.throttle {
            if !throttle.lock().allow(Instant::now()) {
                return;
            }
        }
        EngineInner::request_write(inner);
    }

    fn request_write(inner: &Arc<Self>) {
        if inner.unpersist_requested.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut flags = inner.flags.lock();
            if flags.in_write {
                // Drop this trigger; the follow-up re-samples the freshest
                // state once the in-flight write drains.
                flags.write_wait = true;
                return;
            }
            flags.in_write = true;
            flags.write_wait = false;
        }

        let task = Arc::clone(inner);
        inner.runtime.spawn(async move {
            EngineInner::perform_write(task).await;
        });
    }

    async fn perform_write(inner: Arc<Self>) {
        if inner.unpersist_requested.load(Ordering::SeqCst) {
            inner.flags.lock().in_write = false;
            return;
        }

        if let Err(err) = inner.backend.ensure_ready().await {
            // Non-fatal: the write itself will surface any real failure.
            inner.check_for_error(Some(Arc::new(err)), ErrorSignal::Create);
        }

        // Sampled at flush time, never reused from the triggering
        // notification.
        let snapshot = inner.shared.snapshot();
        let result = inner.backend.write(&snapshot).await;
        EngineInner::finish_write(&inner, result);
    }

    fn finish_write(inner: &Arc<Self>, result: Result<(), StorageError>) {
        let follow_up = {
            let mut flags = inner.flags.lock();
            flags.in_write = false;
            std::mem::take(&mut flags.write_wait)
        };

        if inner.unpersist_requested.load(Ordering::SeqCst) {
            return;
        }

        match result {
            Ok(()) => inner.signals.emit(EngineSignal::Write),
            Err(err) => {
                inner.check_for_error(Some(Arc::new(err)), ErrorSignal::Write);
            }
        }

        if follow_up {
            EngineInner::request_write(inner);
        }
    }
}

/// Builder for [`PersistenceEngine`].
///
/// Missing shared state or backend is the one fatal, non-event error: it is
/// returned directly from [`EngineBuilder::start`] because no signal routing
/// is meaningfully wired without them.
pub struct EngineBuilder {
    shared: Option<Arc<dyn SharedState>>,
    backend: Option<Arc<dyn StorageBackend>>,
    config: PersistenceConfig,
    ready: Option<ReadyCallback>,
    listeners: Vec<SignalListener>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            shared: None,
            backend: None,
            config: PersistenceConfig::default(),
            ready: None,
            listeners: Vec::new(),
        }
    }

    pub fn shared_state(mut self, shared: Arc<dyn SharedState>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: PersistenceConfig) -> Self {
        self.config = config;
        self
    }

    /// Callback invoked exactly once when bootstrap completes, carrying the
    /// initial read error if one occurred.
    pub fn on_ready<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<&StorageError>, ReadyContext) + Send + 'static,
    {
        self.ready = Some(Box::new(callback));
        self
    }

    /// Register a signal listener before bootstrap runs, so the `ready`
    /// signal itself is observable.
    pub fn on_signal<F>(mut self, listener: F) -> Self
    where
        F: Fn(&EngineSignal) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Drive the bootstrap protocol and return the running engine.
    ///
    /// With `invoke_initial_read` set this performs exactly one read
    /// attempt, merges any data into the shared state, activates the change
    /// subscription (before the read when `pre_persist_read` is set, after
    /// it otherwise) and fires `ready` exactly once. A read error does not
    /// prevent readiness; it is carried on the signal and callback for the
    /// caller to inspect.
    pub async fn start(self) -> Result<PersistenceEngine, EngineError> {
        let shared = self
            .shared
            .ok_or_else(|| EngineError::Configuration("shared state not provided".to_string()))?;
        let backend = self
            .backend
            .ok_or_else(|| EngineError::Configuration("storage backend not provided".to_string()))?;

        let throttle = if self.config.write_delay_ms > 0 {
            Some(Mutex::new(RateLimiter::new(Duration::from_millis(
                self.config.write_delay_ms,
            ))))
        } else {
            None
        };

        let signals = SignalHub::new();
        for listener in self.listeners {
            signals.subscribe(listener);
        }

        let inner = Arc::new(EngineInner {
            shared,
            backend,
            config: self.config,
            signals,
            flags: Mutex::new(WriteFlags::default()),
            throttle,
            disposers: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            unpersist_requested: AtomicBool::new(false),
            runtime: Handle::current(),
        });

        let mut read_error: Option<Arc<StorageError>> = None;
        if inner.config.invoke_initial_read {
            if inner.config.pre_persist_read {
                // Mutations during the pending read must be captured and
                // eventually flushed.
                EngineInner::activate_subscription(&inner);
            }

            if let Err(err) = inner.backend.ensure_ready().await {
                inner.check_for_error(Some(Arc::new(err)), ErrorSignal::Create);
            }

            match inner.backend.read(inner.config.filter.as_ref()).await {
                Ok(Some(data)) => {
                    debug!("initial read complete, updating shared state");
                    inner.shared.replace(data, "");
                }
                Ok(None) => {
                    debug!("initial read found no data, shared state untouched");
                }
                Err(err) => {
                    let err = Arc::new(err);
                    inner.check_for_error(Some(Arc::clone(&err)), ErrorSignal::Read);
                    read_error = Some(err);
                }
            }

            if !inner.config.pre_persist_read {
                EngineInner::activate_subscription(&inner);
            }
        } else {
            EngineInner::activate_subscription(&inner);
        }

        inner.signals.emit(EngineSignal::Ready {
            error: read_error.clone(),
        });
        if let Some(callback) = self.ready {
            callback(
                read_error.as_deref(),
                ReadyContext {
                    shared_state: Arc::clone(&inner.shared),
                },
            );
        }

        Ok(PersistenceEngine { inner })
    }
}

/// Handle to a running persistence engine.
///
/// Torn down exactly once by [`PersistenceEngine::unpersist`]; afterwards the
/// instance is permanently inert and cannot be restarted.
pub struct PersistenceEngine {
    inner: Arc<EngineInner>,
}

impl PersistenceEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The cross-cutting signal stream.
    pub fn signals(&self) -> &SignalHub {
        &self.inner.signals
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn shared_state(&self) -> Arc<dyn SharedState> {
        Arc::clone(&self.inner.shared)
    }

    /// Stop persisting: latch `unpersist_requested`, then run and clear every
    /// registered disposer. Idempotent; safe to call during an in-flight
    /// read or write (in-flight callbacks check the latch and become
    /// no-ops). Does not wait for in-flight work to finish; it only
    /// guarantees no new work is scheduled.
    pub fn unpersist(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        self.inner.unpersist_requested.store(true, Ordering::SeqCst);

        let disposers: Vec<Disposer> = {
            let mut guard = self.inner.disposers.lock();
            guard.drain(..).collect()
        };
        for disposer in disposers {
            disposer();
        }
    }

    /// Read items matching `filter` from the store into the shared state.
    /// Backends without item-granular storage signal `NotImplemented`.
    pub async fn persist_items(&self, filter: Option<&Snapshot>) -> Result<(), EngineError> {
        if self.inner.unpersist_requested.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }
        self.inner
            .backend
            .persist_items(filter)
            .await
            .map_err(EngineError::from)
    }

    /// Remove a single item from the store by key. Backends without
    /// item-granular storage signal `NotImplemented`.
    pub async fn unpersist_item(&self, key: &str) -> Result<(), EngineError> {
        if self.inner.unpersist_requested.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }
        self.inner
            .backend
            .unpersist_item(key)
            .await
            .map_err(EngineError::from)
    }
}
