//! Registry of monitored keys and their live observation subscriptions.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use zephyr_store::{ChangeCallback, StoreAdapter, SubscriptionId};

#[derive(Debug, Default)]
struct MonitorState {
    monitored: BTreeSet<String>,
    subscriptions: HashMap<String, SubscriptionId>,
    torn_down: bool,
}

/// Tracks which keys are monitored and which currently have a subscription
/// registered with the local store.
///
/// # Invariants
///
/// - Every subscribed key is monitored
/// - The reserved sync key is never monitored
/// - A key has at most one subscription
/// - Nothing is subscribed after [`teardown`](Self::teardown)
///
/// The registry lock is held while calling the store's `observe` and
/// `unobserve`, which never invoke callbacks themselves.
///
/// Suspending a key releases its subscription without forgetting that the
/// key is monitored; the engine does this around each of its own writes so
/// the write is not mistaken for a user change.
pub struct KeyMonitor<L: StoreAdapter> {
    local: Arc<L>,
    sync_key: String,
    on_change: ChangeCallback,
    state: Mutex<MonitorState>,
}

impl<L: StoreAdapter> KeyMonitor<L> {
    /// Creates an empty registry that installs `on_change` for each key.
    pub fn new(local: Arc<L>, sync_key: impl Into<String>, on_change: ChangeCallback) -> Self {
        Self {
            local,
            sync_key: sync_key.into(),
            on_change,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Starts monitoring keys. Returns how many keys were newly added.
    pub fn monitor<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut state = self.state.lock();
        if state.torn_down {
            tracing::debug!("refusing to monitor keys after teardown");
            return 0;
        }
        let mut added = 0;
        for key in keys {
            let key = key.into();
            if key == self.sync_key {
                tracing::debug!(key = %key, "refusing to monitor the sync key");
                continue;
            }
            if state.monitored.insert(key.clone()) {
                self.subscribe(&mut state, &key);
                added += 1;
            }
        }
        added
    }

    /// Stops monitoring keys. Returns how many keys were removed.
    pub fn unmonitor<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut state = self.state.lock();
        let mut removed = 0;
        for key in keys {
            let key = key.into();
            if state.monitored.remove(&key) {
                if let Some(id) = state.subscriptions.remove(&key) {
                    self.local.unobserve(id);
                }
                removed += 1;
            }
        }
        removed
    }

    /// Releases the subscription for `key`, if any.
    ///
    /// Returns true if a subscription was released.
    pub fn suspend(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.subscriptions.remove(key) {
            Some(id) => {
                self.local.unobserve(id);
                true
            }
            None => false,
        }
    }

    /// Re-registers the subscription for a monitored key that lacks one.
    ///
    /// Returns true if a subscription was registered.
    pub fn resume(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if state.torn_down
            || !state.monitored.contains(key)
            || state.subscriptions.contains_key(key)
        {
            return false;
        }
        self.subscribe(&mut state, key)
    }

    /// Suspends `key` until the returned guard is dropped.
    pub fn suspended<'a>(&'a self, key: &'a str) -> SuspendGuard<'a, L> {
        let was_subscribed = self.suspend(key);
        SuspendGuard {
            monitor: self,
            key,
            was_subscribed,
        }
    }

    /// Returns true if `key` is monitored.
    pub fn is_monitored(&self, key: &str) -> bool {
        self.state.lock().monitored.contains(key)
    }

    /// Returns true if `key` has a live subscription.
    pub fn is_subscribed(&self, key: &str) -> bool {
        self.state.lock().subscriptions.contains_key(key)
    }

    /// Returns the monitored keys in sorted order.
    pub fn monitored_keys(&self) -> Vec<String> {
        self.state.lock().monitored.iter().cloned().collect()
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Releases every subscription and forgets all monitored keys.
    ///
    /// The registry refuses new subscriptions afterwards.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        for (_, id) in state.subscriptions.drain() {
            self.local.unobserve(id);
        }
        state.monitored.clear();
        state.torn_down = true;
    }

    /// Returns true once [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.state.lock().torn_down
    }

    fn subscribe(&self, state: &mut MonitorState, key: &str) -> bool {
        match self.local.observe(key, Arc::clone(&self.on_change)) {
            Ok(id) => {
                state.subscriptions.insert(key.to_string(), id);
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to observe key");
                false
            }
        }
    }
}

/// Resumes a suspended key when dropped.
///
/// Only keys that were subscribed when the guard was taken are resumed.
pub struct SuspendGuard<'a, L: StoreAdapter> {
    monitor: &'a KeyMonitor<L>,
    key: &'a str,
    was_subscribed: bool,
}

impl<L: StoreAdapter> Drop for SuspendGuard<'_, L> {
    fn drop(&mut self) {
        if self.was_subscribed {
            self.monitor.resume(self.key);
        }
    }
}
