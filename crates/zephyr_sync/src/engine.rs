//! The sync engine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::monitor::KeyMonitor;
use crate::notifier::{EventMessage, EventSender, LifecycleEvent};
use crate::queue::SerialQueue;
use crate::resolver::{fresh_timestamp, resolve, sync_timestamp, Authority};
use crate::stats::{SyncMode, SyncReport, SyncStats};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use zephyr_store::{ChangeCallback, RemoteStore, Snapshot, StoreAdapter, SubscriptionId, Value};

/// State shared between the engine handle, store callbacks and queue tasks.
pub(crate) struct EngineCore<L: StoreAdapter, R: RemoteStore> {
    pub(crate) monitor: KeyMonitor<L>,
    pub(crate) local: Arc<L>,
    pub(crate) remote: Arc<R>,
    pub(crate) sync_key: String,
    pub(crate) queue: SerialQueue,
    pub(crate) stats: RwLock<SyncStats>,
    external_subscription: Mutex<Option<SubscriptionId>>,
    debug_logging: AtomicBool,
    flush_remote: AtomicBool,
}

impl<L: StoreAdapter, R: RemoteStore> EngineCore<L, R> {
    /// Reads both stores.
    pub(crate) fn snapshots(&self) -> SyncResult<(Snapshot, Snapshot)> {
        Ok((self.local.snapshot()?, self.remote.snapshot()?))
    }

    /// Resolves the authority and transfers `keys`, or every key when `None`.
    pub(crate) fn run_sync(&self, keys: Option<Vec<String>>) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let (local, remote) = self.snapshots()?;
        let authority = resolve(&local, &remote, &self.sync_key);

        let (mode, keys) = match keys {
            Some(keys) => (SyncMode::Partial, keys),
            None => {
                let all: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
                (SyncMode::Full, all.into_iter().cloned().collect())
            }
        };

        tracing::debug!(%authority, ?mode, keys = keys.len(), "starting sync");
        Ok(self.transfer(authority, mode, &keys, &local, &remote, start))
    }

    /// Copies `keys` from a fixed source without consulting the resolver.
    pub(crate) fn transfer_keys(&self, authority: Authority, keys: &[String]) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let (local, remote) = self.snapshots()?;
        Ok(self.transfer(authority, SyncMode::Partial, keys, &local, &remote, start))
    }

    /// Copies `keys` from the `authority` snapshot into the other store.
    ///
    /// A push first stamps a fresh sync timestamp into the remote store.
    /// Keys missing from the source are deleted at the destination.
    pub(crate) fn transfer(
        &self,
        authority: Authority,
        mode: SyncMode,
        keys: &[String],
        local: &Snapshot,
        remote: &Snapshot,
        start: Instant,
    ) -> SyncReport {
        let mut report = SyncReport::new(authority, mode);

        let (source, destination): (&Snapshot, &dyn StoreAdapter) = match authority {
            Authority::Local => (local, &*self.remote as &dyn StoreAdapter),
            Authority::Remote => (remote, &*self.local as &dyn StoreAdapter),
        };

        if authority == Authority::Local {
            let floor = sync_timestamp(local, &self.sync_key).max(sync_timestamp(remote, &self.sync_key));
            self.stamp(destination, floor);
        }

        for key in keys {
            if *key == self.sync_key {
                continue;
            }
            self.write_key(destination, authority, key, source.get(key).cloned(), &mut report);
        }

        if authority == Authority::Local && self.flush_remote.load(Ordering::SeqCst) {
            if let Err(e) = self.remote.flush() {
                tracing::warn!(error = %e, "failed to flush remote store");
            }
        }

        report.duration = start.elapsed();
        self.stats.write().record(&report);
        tracing::debug!(
            %authority,
            written = report.written,
            deleted = report.deleted,
            failed = report.failed,
            "sync finished"
        );
        report
    }

    /// Writes a fresh sync timestamp into `store`.
    pub(crate) fn stamp(&self, store: &dyn StoreAdapter, floor: Option<chrono::DateTime<chrono::Utc>>) {
        let ts = fresh_timestamp(floor);
        if let Err(e) = store.write(&self.sync_key, Some(Value::Timestamp(ts))) {
            tracing::warn!(error = %e, "failed to write sync timestamp");
        }
    }

    fn write_key(
        &self,
        destination: &dyn StoreAdapter,
        authority: Authority,
        key: &str,
        value: Option<Value>,
        report: &mut SyncReport,
    ) {
        let _suspended = self.monitor.suspended(key);
        let deleting = value.is_none();

        let result = match value {
            Some(value) => destination.write(key, Some(value)),
            None => destination.delete(key),
        };

        match result {
            Ok(()) => {
                if deleting {
                    report.deleted += 1;
                } else {
                    report.written += 1;
                }
                self.log_transfer(key, authority, deleting);
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(key = %key, to = %authority.opposite(), error = %e, "failed to sync key");
            }
        }
    }

    fn log_transfer(&self, key: &str, authority: Authority, deleted: bool) {
        let to = authority.opposite();
        let action = if deleted { "removed" } else { "synchronized" };
        if self.debug_logging.load(Ordering::Relaxed) {
            tracing::info!(key = %key, from = %authority, %to, "{action} key");
        } else {
            tracing::trace!(key = %key, from = %authority, %to, "{action} key");
        }
    }

    fn shutdown(&self) {
        self.monitor.teardown();
        if let Some(id) = self.external_subscription.lock().take() {
            self.remote.unsubscribe_external_changes(id);
        }
        self.queue.shutdown();
    }
}

/// Keeps a local and a remote key-value store eventually consistent.
///
/// The engine owns both store adapters, the registry of monitored keys and
/// a serial queue on which every sync runs. Explicit calls
/// ([`sync`](Self::sync), [`sync_keys`](Self::sync_keys)) block until their
/// run completes; changes to monitored keys and external-change
/// notifications are synced in the background.
///
/// # Example
///
/// ```rust
/// use zephyr_store::{MemoryStore, StoreAdapter, Value};
/// use zephyr_sync::{SyncConfig, SyncEngine};
///
/// let engine = SyncEngine::new(SyncConfig::default(), MemoryStore::new(), MemoryStore::new()).unwrap();
/// engine.local().write("theme", Some(Value::from("dark"))).unwrap();
///
/// engine.sync().unwrap();
/// assert_eq!(engine.remote().get("theme").unwrap(), Some(Value::from("dark")));
/// ```
pub struct SyncEngine<L: StoreAdapter + 'static, R: RemoteStore + 'static> {
    core: Arc<EngineCore<L, R>>,
    events: Sender<EventMessage>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<L: StoreAdapter + 'static, R: RemoteStore + 'static> SyncEngine<L, R> {
    /// Creates an engine owning both stores.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be spawned or the remote store
    /// refuses the external-change subscription.
    pub fn new(config: SyncConfig, local: L, remote: R) -> SyncResult<Self> {
        Self::with_shared(config, Arc::new(local), Arc::new(remote))
    }

    /// Creates an engine over stores the caller keeps handles to.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_shared(config: SyncConfig, local: Arc<L>, remote: Arc<R>) -> SyncResult<Self> {
        let queue = SerialQueue::new("zephyr-sync")?;

        let core = Arc::new_cyclic(|weak: &Weak<EngineCore<L, R>>| {
            let weak = weak.clone();
            let on_change: ChangeCallback = Arc::new(move |key: &str| {
                if let Some(core) = weak.upgrade() {
                    core.on_local_change(key);
                }
            });

            EngineCore {
                monitor: KeyMonitor::new(Arc::clone(&local), config.sync_key.clone(), on_change),
                local,
                remote,
                sync_key: config.sync_key.clone(),
                queue,
                stats: RwLock::new(SyncStats::default()),
                external_subscription: Mutex::new(None),
                debug_logging: AtomicBool::new(config.debug_logging),
                flush_remote: AtomicBool::new(config.flush_remote_on_every_change),
            }
        });

        let weak = Arc::downgrade(&core);
        let subscription = core.remote.subscribe_external_changes(Arc::new(
            move |keys: &BTreeSet<String>| {
                if let Some(core) = weak.upgrade() {
                    if let Err(e) = core.handle_event(LifecycleEvent::ExternalChange(keys.clone())) {
                        tracing::debug!(error = %e, "dropping external change");
                    }
                }
            },
        ));
        match subscription {
            Ok(id) => *core.external_subscription.lock() = Some(id),
            Err(e) => {
                core.shutdown();
                return Err(e.into());
            }
        }

        let (events, receiver) = mpsc::channel::<EventMessage>();
        let weak = Arc::downgrade(&core);
        let spawned = thread::Builder::new()
            .name("zephyr-events".into())
            .spawn(move || {
                for message in receiver {
                    let EventMessage::Event(event) = message else { break };
                    let Some(core) = weak.upgrade() else { break };
                    if let Err(e) = core.handle_event(event) {
                        tracing::debug!(error = %e, "dropping lifecycle event");
                    }
                }
                tracing::debug!("event listener stopped");
            });
        let listener = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                core.shutdown();
                return Err(SyncError::Spawn(e));
            }
        };

        tracing::debug!(sync_key = %config.sync_key, "sync engine started");
        Ok(Self {
            core,
            events,
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Synchronizes every key, blocking until done.
    ///
    /// # Errors
    ///
    /// Fails if a store snapshot cannot be read or the engine is stopped.
    /// Failures of individual keys are reported in the returned
    /// [`SyncReport`], not as errors.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let core = Arc::clone(&self.core);
        self.core.queue.submit_and_wait(move || core.run_sync(None))?
    }

    /// Synchronizes only `keys`, blocking until done.
    ///
    /// Keys absent from the authoritative store are deleted from the other.
    ///
    /// # Errors
    ///
    /// See [`sync`](Self::sync).
    pub fn sync_keys<I, K>(&self, keys: I) -> SyncResult<SyncReport>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let core = Arc::clone(&self.core);
        self.core.queue.submit_and_wait(move || core.run_sync(Some(keys)))?
    }

    /// Starts monitoring keys; local changes to them sync automatically.
    ///
    /// Returns how many keys were newly monitored.
    pub fn monitor<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.core.monitor.monitor(keys)
    }

    /// Stops monitoring keys.
    ///
    /// Returns how many keys were removed.
    pub fn unmonitor<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.core.monitor.unmonitor(keys)
    }

    /// Returns the monitored keys in sorted order.
    pub fn monitored_keys(&self) -> Vec<String> {
        self.core.monitor.monitored_keys()
    }

    /// Returns true if `key` is monitored.
    pub fn is_monitored(&self, key: &str) -> bool {
        self.core.monitor.is_monitored(key)
    }

    /// Handles a lifecycle event on the calling thread's behalf.
    ///
    /// The resulting work is queued; this call does not wait for it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` after shutdown.
    pub fn notify(&self, event: LifecycleEvent) -> SyncResult<()> {
        self.core.handle_event(event)
    }

    /// Returns a sender that delivers lifecycle events to this engine.
    ///
    /// Sending fails with `SyncError::EngineStopped` once the engine has
    /// been shut down.
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.events.clone())
    }

    /// Blocks until every task queued so far has finished.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` after shutdown.
    pub fn wait_for_pending(&self) -> SyncResult<()> {
        self.core.queue.wait_idle()
    }

    /// Returns cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.core.stats.read().clone()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_debug_logging(self.core.debug_logging.load(Ordering::SeqCst))
            .with_flush_remote_on_every_change(self.core.flush_remote.load(Ordering::SeqCst))
            .with_sync_key(self.core.sync_key.clone())
    }

    /// Enables or disables per-key debug logging.
    pub fn set_debug_logging(&self, enabled: bool) {
        self.core.debug_logging.store(enabled, Ordering::SeqCst);
    }

    /// Sets whether the remote store is flushed after each push.
    pub fn set_flush_remote_on_every_change(&self, enabled: bool) {
        self.core.flush_remote.store(enabled, Ordering::SeqCst);
    }

    /// Returns the reserved sync timestamp key.
    pub fn sync_key(&self) -> &str {
        &self.core.sync_key
    }

    /// Returns the local store.
    pub fn local(&self) -> &L {
        &self.core.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &R {
        &self.core.remote
    }

    /// Releases every subscription, stops the event listener and stops the
    /// worker after draining it.
    ///
    /// Later calls fail with `SyncError::EngineStopped`. Dropping the
    /// engine shuts it down as well.
    pub fn shutdown(&self) {
        self.core.shutdown();

        if let Some(listener) = self.listener.lock().take() {
            // Fails only if the listener already exited
            let _ = self.events.send(EventMessage::Stop);
            if listener.join().is_err() {
                tracing::error!("event listener panicked");
            }
        }
        tracing::debug!("sync engine stopped");
    }
}

impl<L: StoreAdapter + 'static, R: RemoteStore + 'static> Drop for SyncEngine<L, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
