//! In-memory store for tests and ephemeral state.

use crate::adapter::{
    ChangeCallback, ExternalChangeCallback, RemoteStore, Snapshot, StoreAdapter, SubscriptionId,
};
use crate::error::{StoreError, StoreResult};
use crate::observers::ObserverSet;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// An in-memory key-value store.
///
/// This store keeps everything in memory and is suitable for:
/// - Unit and integration tests (it doubles as a fake for either side)
/// - Ephemeral stores that don't need persistence
///
/// Every `write`/`delete` through the adapter is counted per key, which
/// lets tests assert that the engine never writes back to the store it is
/// syncing from.
///
/// # Example
///
/// ```rust
/// use zephyr_store::{MemoryStore, StoreAdapter, Value};
///
/// let store = MemoryStore::new();
/// store.write("volume", Some(Value::from(7))).unwrap();
/// store.delete("volume").unwrap();
/// assert!(store.snapshot().unwrap().is_empty());
/// assert_eq!(store.write_count("volume"), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
    observers: ObserverSet,
    writes: RwLock<HashMap<String, u64>>,
    flushes: AtomicU64,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing contents.
    ///
    /// Seeding does not count as writes and notifies nobody.
    #[must_use]
    pub fn with_data(data: Snapshot) -> Self {
        Self {
            data: RwLock::new(data),
            ..Self::default()
        }
    }

    /// Applies changes made "by another device".
    ///
    /// Values are stored without touching the write counters or per-key
    /// observers, then external-change subscribers receive the changed keys.
    pub fn apply_external_change<I, K>(&self, changes: I)
    where
        I: IntoIterator<Item = (K, Option<Value>)>,
        K: Into<String>,
    {
        let mut keys = BTreeSet::new();
        {
            let mut data = self.data.write();
            for (key, value) in changes {
                let key = key.into();
                match value {
                    Some(value) => {
                        data.insert(key.clone(), value);
                    }
                    None => {
                        data.remove(&key);
                    }
                }
                keys.insert(key);
            }
        }
        self.observers.notify_external(&keys);
    }

    /// Makes subsequent writes and flushes fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of adapter writes (including deletes) made to `key`.
    pub fn write_count(&self, key: &str) -> u64 {
        self.writes.read().get(key).copied().unwrap_or(0)
    }

    /// Number of adapter writes made to any key.
    pub fn total_writes(&self) -> u64 {
        self.writes.read().values().sum()
    }

    /// Number of successful flushes.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of live per-key subscriptions.
    pub fn observer_count(&self) -> usize {
        self.observers.observer_count()
    }

    /// Number of live external-change subscriptions.
    pub fn external_count(&self) -> usize {
        self.observers.external_count()
    }

    /// Number of live subscriptions for `key`.
    pub fn observer_count_for(&self, key: &str) -> usize {
        self.observers.observer_count_for(key)
    }

    fn check_failing(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::backend("memory store configured to fail"))
        } else {
            Ok(())
        }
    }
}

impl StoreAdapter for MemoryStore {
    fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(self.data.read().clone())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: Option<Value>) -> StoreResult<()> {
        self.check_failing()?;

        {
            let mut data = self.data.write();
            match value {
                Some(value) => {
                    data.insert(key.to_string(), value);
                }
                None => {
                    data.remove(key);
                }
            }
        }
        *self.writes.write().entry(key.to_string()).or_insert(0) += 1;

        // Locks are released before observers run
        self.observers.notify(key);
        Ok(())
    }

    fn observe(&self, key: &str, callback: ChangeCallback) -> StoreResult<SubscriptionId> {
        Ok(self.observers.observe(key, callback))
    }

    fn unobserve(&self, id: SubscriptionId) {
        self.observers.unobserve(id);
    }

    fn flush(&self) -> StoreResult<()> {
        self.check_failing()?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe_external_changes(
        &self,
        callback: ExternalChangeCallback,
    ) -> StoreResult<SubscriptionId> {
        Ok(self.observers.subscribe_external(callback))
    }

    fn unsubscribe_external_changes(&self, id: SubscriptionId) {
        self.observers.unsubscribe_external(id);
    }
}
