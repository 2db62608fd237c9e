//! Load coordinator: fetch, import and query against a balance store
//!
//! One coordinator owns the load state, the progress counters and the single
//! pending query. The host drives it through four actions:
//!
//! | Action       | Effect                                                    |
//! |--------------|-----------------------------------------------------------|
//! | `initialize` | spawn the load task (version check, fetch, import)        |
//! | `query`      | classify an address against whatever is loaded so far     |
//! | `stop`       | interrupt the running import before its next batch        |
//! | `resync`     | drop local data and run a full import, skipping the cache |
//!
//! ## Pending queries
//!
//! A query that misses while the state is `Loading` is remembered. Between
//! batch transactions the import re-checks it and emits
//! [`LoadEvent::QueryResolved`] as soon as the address shows up. When the
//! import completes, a still-pending query is resolved one last time. Each
//! pending query is resolved at most once; a newer query replaces it.
//!
//! ## Locking
//!
//! State lives behind a `std::sync::Mutex` that is never held across an await
//! point or while the sink runs. At most one load task runs at a time; the
//! `active` flag is claimed under the state lock and released when the task
//! ends, however it ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use lookup_core::{Address, Dataset, LookupConfig, StorageMode};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{LookupError, Result};
use crate::events::{
    estimate_eta, noop_sink, EventSink, LoadEvent, Phase, Progress, QueryOutcome, StatusEvent,
};
use crate::source::{source_for, DatasetSource};
use crate::store::{BalanceStore, MemoryStore, PersistentStore};

/// Lifecycle of the loaded dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Uninitialized,
    Loading { processed: u64, total: u64 },
    Loaded,
    /// Stopped mid-import; the store holds whole batches only
    Interrupted,
}

/// Cancellation flag for one load run
struct CancelFlag {
    tx: watch::Sender<bool>,
}

impl CancelFlag {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    fn cancel(&self) {
        self.tx.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

struct CoordinatorState {
    load: LoadState,
    pending: Option<Address>,
    progress: Progress,
    cancel: Arc<CancelFlag>,
}

struct Inner {
    config: LookupConfig,
    store: Arc<dyn BalanceStore>,
    source: Arc<dyn DatasetSource>,
    sink: Arc<dyn EventSink>,
    state: Mutex<CoordinatorState>,
    active: watch::Sender<bool>,
}

/// Holds the load slot; dropping it marks the coordinator idle
struct ActiveLoad {
    inner: Arc<Inner>,
}

impl Drop for ActiveLoad {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        // Still Loading here means the run was superseded or aborted
        if let LoadState::Loading { .. } = state.load {
            state.load = LoadState::Uninitialized;
            state.pending = None;
        }
        self.inner.active.send_replace(false);
    }
}

/// Handle to the load coordinator; clones share the same state
#[derive(Clone)]
pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl LoadCoordinator {
    /// Start the load sequence in a background task.
    ///
    /// Returns immediately; progress and completion arrive through the sink.
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) -> Result<()> {
        self.inner.config.validate()?;

        let (active, cancel) = self.inner.claim(LoadState::Loading {
            processed: 0,
            total: 0,
        })?;
        tracing::info!(mode = %self.mode(), "Initializing balance lookup");
        self.inner.spawn_load(active, cancel, false);
        Ok(())
    }

    /// Look up an address against the data available right now.
    ///
    /// The address is an exact, case-sensitive key; format validation is the
    /// caller's job.
    pub fn query(&self, address: &str) -> Result<QueryOutcome> {
        let mut state = self.inner.lock_state();
        if state.load == LoadState::Uninitialized {
            return Err(LookupError::NotReady);
        }

        let outcome = match self.inner.store.get(address)? {
            Some(amount) => {
                state.pending = None;
                QueryOutcome::Found(amount)
            }
            None if matches!(state.load, LoadState::Loading { .. }) => {
                state.pending = Some(address.to_string());
                QueryOutcome::NotFoundPending
            }
            None => {
                state.pending = None;
                QueryOutcome::NotFoundFinal
            }
        };

        tracing::debug!(address, outcome = ?outcome, state = ?state.load, "Query");
        Ok(outcome)
    }

    /// Interrupt a running load.
    ///
    /// Best effort: an in-flight batch still commits, the next one never
    /// starts. Returns `false` when nothing was loading.
    pub fn stop(&self) -> bool {
        let mut state = self.inner.lock_state();
        match state.load {
            LoadState::Loading { processed, total } => {
                state.load = LoadState::Interrupted;
                state.pending = None;
                state.cancel.cancel();
                tracing::info!(processed, total, "Stop requested");
                true
            }
            _ => false,
        }
    }

    /// Discard local balances and run a full import, ignoring the cached
    /// version. Waits for any running load to halt first.
    pub async fn resync(&self) -> Result<()> {
        self.inner.config.validate()?;

        self.inner.lock_state().cancel.cancel();
        self.wait().await;

        // Queries see Uninitialized while the store is being emptied
        let (active, cancel) = self.inner.claim(LoadState::Uninitialized)?;
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.purge()).await??;
        tracing::info!("Discarded local balances, starting fresh import");

        self.inner.lock_state().load = LoadState::Loading {
            processed: 0,
            total: 0,
        };
        self.inner.spawn_load(active, cancel, true);
        Ok(())
    }

    /// Wait until no load task is running
    pub async fn wait(&self) {
        let mut active = self.inner.active.subscribe();
        let _ = active.wait_for(|running| !*running).await;
    }

    pub fn state(&self) -> LoadState {
        self.inner.lock_state().load
    }

    pub fn progress(&self) -> Progress {
        self.inner.lock_state().progress
    }

    pub fn pending_query(&self) -> Option<Address> {
        self.inner.lock_state().pending.clone()
    }

    pub fn mode(&self) -> StorageMode {
        self.inner.store.mode()
    }

    pub fn config(&self) -> &LookupConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn BalanceStore> {
        &self.inner.store
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the load slot and reset the run state to `load`
    fn claim(self: &Arc<Self>, load: LoadState) -> Result<(ActiveLoad, Arc<CancelFlag>)> {
        let mut state = self.lock_state();
        let running = *self.active.borrow();
        if running {
            return Err(LookupError::LoadInProgress);
        }
        self.active.send_replace(true);

        let cancel = Arc::new(CancelFlag::new());
        state.cancel = Arc::clone(&cancel);
        state.load = load;
        state.pending = None;
        state.progress = Progress::default();

        let active = ActiveLoad {
            inner: Arc::clone(self),
        };
        Ok((active, cancel))
    }

    fn spawn_load(self: &Arc<Self>, active: ActiveLoad, cancel: Arc<CancelFlag>, force: bool) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _active = active;
            inner.run_load(&cancel, force).await;
        });
    }

    async fn run_load(&self, cancel: &CancelFlag, force: bool) {
        let started = Instant::now();
        match self.load_sequence(cancel, force).await {
            Ok(()) => tracing::debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Load task finished"
            ),
            Err(err) => self.fail(err),
        }
    }

    async fn load_sequence(&self, cancel: &CancelFlag, force: bool) -> Result<()> {
        if cancel.is_cancelled() {
            self.halt();
            return Ok(());
        }

        let version = self.config.dataset_version.as_str();
        if !force && self.has_current_data(version)? {
            let total = self.store.len()?;
            tracing::info!(version, total, "Local balances are current, skipping download");
            return self.finish(total, format!("Loaded {} balances from local store", total));
        }

        let location = self.source.location();
        tracing::info!(source = %location, mode = %self.store.mode(), "Downloading dataset");
        self.emit_status(Phase::Loading, format!("Downloading dataset from {}", location));

        let bytes = tokio::select! {
            fetched = self.source.fetch() => fetched?,
            _ = cancel.cancelled() => {
                self.halt();
                return Ok(());
            }
        };

        self.emit_status(Phase::Parsing, format!("Parsing {} bytes", bytes.len()));
        let dataset = tokio::task::spawn_blocking(move || Dataset::from_json(&bytes)).await??;
        tracing::info!(
            records = dataset.len(),
            skipped = dataset.skipped(),
            "Parsed dataset"
        );

        match self.store.mode() {
            StorageMode::Memory => self.install(dataset, cancel),
            StorageMode::Persistent => self.import_batches(dataset, cancel).await,
        }
    }

    /// Stored version matches and the store is non-empty
    fn has_current_data(&self, version: &str) -> Result<bool> {
        let stored = self.store.stored_version()?;
        if stored.as_deref() != Some(version) {
            tracing::info!(stored = ?stored, current = version, "Dataset version changed");
            return Ok(false);
        }
        Ok(!self.store.is_empty()?)
    }

    /// Memory plan: one update, no partial window
    fn install(&self, dataset: Dataset, cancel: &CancelFlag) -> Result<()> {
        let total = dataset.len() as u64;
        {
            // `stop` takes this lock too: it lands before the check or after Loaded
            let mut state = self.lock_state();
            if cancel.is_cancelled() {
                drop(state);
                self.halt();
                return Ok(());
            }
            self.store.replace_all(dataset.into_records())?;
            self.store.set_version(&self.config.dataset_version)?;
            state.load = LoadState::Loaded;
            state.progress = Progress::new(total, total);
        }

        tracing::info!(total, "Balances loaded into memory");
        self.announce_complete(format!("Loaded {} balances", total))
    }

    /// Persistent plan: sequential batches, one transaction each
    async fn import_batches(&self, dataset: Dataset, cancel: &CancelFlag) -> Result<()> {
        let total = dataset.len() as u64;
        let batch_size = self.config.batch_size;
        let batch_count = dataset.batch_count(batch_size);

        if cancel.is_cancelled() {
            self.halt();
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.clear()).await??;

        self.update_progress(Progress::new(0, total));
        self.emit_status(
            Phase::Syncing,
            format!("Importing {} balances in {} batches", total, batch_count),
        );

        let started = Instant::now();
        let mut processed = 0u64;

        for (index, batch) in dataset.batches(batch_size).enumerate() {
            if cancel.is_cancelled() {
                self.halt();
                return Ok(());
            }

            let store = Arc::clone(&self.store);
            let records = batch.to_vec();
            tokio::task::spawn_blocking(move || store.insert_batch(&records)).await??;
            processed += batch.len() as u64;

            // Stopped while the batch was in flight: keep it, report nothing
            if cancel.is_cancelled() {
                self.halt();
                return Ok(());
            }

            self.update_progress(Progress {
                processed,
                total,
                eta_seconds: estimate_eta(started.elapsed(), processed, total),
            });
            tracing::debug!(
                batch = index + 1,
                batches = batch_count,
                processed,
                total,
                "Committed batch"
            );
            self.emit_status(
                Phase::Syncing,
                format!("Imported batch {}/{}", index + 1, batch_count),
            );

            self.resolve_pending_if_found()?;
            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            self.halt();
            return Ok(());
        }

        self.store.set_version(&self.config.dataset_version)?;
        tracing::info!(
            total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset import complete"
        );
        self.finish(total, format!("Imported {} balances", total))
    }

    fn update_progress(&self, progress: Progress) {
        let mut state = self.lock_state();
        if let LoadState::Loading { .. } = state.load {
            state.load = LoadState::Loading {
                processed: progress.processed,
                total: progress.total,
            };
            state.progress = progress;
        }
    }

    fn finish(&self, total: u64, message: String) -> Result<()> {
        {
            let mut state = self.lock_state();
            if !matches!(state.load, LoadState::Loading { .. }) {
                drop(state);
                self.halt();
                return Ok(());
            }
            state.load = LoadState::Loaded;
            state.progress = Progress::new(total, total);
        }

        self.announce_complete(message)
    }

    fn announce_complete(&self, message: String) -> Result<()> {
        self.emit_status(Phase::Complete, message);
        self.resolve_pending_final()
    }

    /// Between batches: resolve the pending query only if it is now present
    fn resolve_pending_if_found(&self) -> Result<()> {
        let resolved = {
            let mut state = self.lock_state();
            let Some(address) = state.pending.clone() else {
                return Ok(());
            };
            match self.store.get(&address)? {
                Some(amount) => {
                    state.pending = None;
                    Some((address, amount))
                }
                None => None,
            }
        };

        if let Some((address, amount)) = resolved {
            tracing::info!(%address, amount, "Pending query found during import");
            self.sink.emit(LoadEvent::QueryResolved {
                address,
                outcome: QueryOutcome::Found(amount),
            });
        }
        Ok(())
    }

    /// After completion: whatever is still pending gets its final answer
    fn resolve_pending_final(&self) -> Result<()> {
        let resolved = {
            let mut state = self.lock_state();
            match state.pending.take() {
                Some(address) => {
                    let outcome = match self.store.get(&address)? {
                        Some(amount) => QueryOutcome::Found(amount),
                        None => QueryOutcome::NotFoundFinal,
                    };
                    Some((address, outcome))
                }
                None => None,
            }
        };

        if let Some((address, outcome)) = resolved {
            tracing::info!(%address, outcome = ?outcome, "Pending query resolved after load");
            self.sink.emit(LoadEvent::QueryResolved { address, outcome });
        }
        Ok(())
    }

    fn halt(&self) {
        let progress = self.lock_state().progress;
        tracing::info!(
            processed = progress.processed,
            remaining = progress.remaining(),
            "Load stopped"
        );
        self.emit_status(
            Phase::Stopped,
            format!(
                "Stopped after {} of {} balances",
                progress.processed, progress.total
            ),
        );
    }

    fn fail(&self, err: LookupError) {
        tracing::error!(error = %err, code = err.code(), "Load failed");
        {
            let mut state = self.lock_state();
            state.load = LoadState::Uninitialized;
            state.pending = None;
        }
        self.emit_status(Phase::Error, err.to_string());
    }

    fn emit_status(&self, phase: Phase, message: impl Into<String>) {
        let progress = self.lock_state().progress;
        self.sink.emit(LoadEvent::Status(StatusEvent {
            phase,
            processed: progress.processed,
            total: progress.total,
            percent: progress.percent(),
            eta_seconds: progress.eta_seconds,
            message: message.into(),
        }));
    }
}

/// Open the store matching the configured mode
pub fn open_store(config: &LookupConfig) -> Result<Arc<dyn BalanceStore>> {
    let store: Arc<dyn BalanceStore> = match config.mode {
        StorageMode::Memory => Arc::new(MemoryStore::new()),
        StorageMode::Persistent => Arc::new(PersistentStore::open(config.store_path())?),
    };
    Ok(store)
}

/// Builder for LoadCoordinator
pub struct CoordinatorBuilder {
    config: LookupConfig,
    store: Option<Arc<dyn BalanceStore>>,
    source: Option<Arc<dyn DatasetSource>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl CoordinatorBuilder {
    pub fn new(config: LookupConfig) -> Self {
        Self {
            config,
            store: None,
            source: None,
            sink: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn BalanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn source(mut self, source: Arc<dyn DatasetSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sink(mut self, sink: impl EventSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn build(self) -> Result<LoadCoordinator> {
        self.config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config)?,
        };
        if store.mode() != self.config.mode {
            tracing::warn!(
                configured = %self.config.mode,
                store = %store.mode(),
                "Store mode differs from config, following the store"
            );
        }

        let source = self.source.unwrap_or_else(|| source_for(&self.config));
        let sink: Arc<dyn EventSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(noop_sink()),
        };

        let state = CoordinatorState {
            load: LoadState::Uninitialized,
            pending: None,
            progress: Progress::default(),
            cancel: Arc::new(CancelFlag::new()),
        };

        Ok(LoadCoordinator {
            inner: Arc::new(Inner {
                config: self.config,
                store,
                source,
                sink,
                state: Mutex::new(state),
                active: watch::channel(false).0,
            }),
        })
    }
}
