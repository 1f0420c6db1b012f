//! Observer bookkeeping shared by the bundled stores.

use crate::adapter::{ChangeCallback, ExternalChangeCallback, SubscriptionId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Registry of per-key and external-change callbacks.
///
/// Callbacks are cloned out of the registry before being invoked, so a
/// callback may freely register or release subscriptions, or write to the
/// store that notified it.
#[derive(Default)]
pub struct ObserverSet {
    next_id: AtomicU64,
    by_key: RwLock<HashMap<String, Vec<(SubscriptionId, ChangeCallback)>>>,
    external: RwLock<Vec<(SubscriptionId, ExternalChangeCallback)>>,
}

impl ObserverSet {
    /// Creates an empty observer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Registers a callback for `key`.
    pub fn observe(&self, key: &str, callback: ChangeCallback) -> SubscriptionId {
        let id = self.next_id();
        self.by_key
            .write()
            .entry(key.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Releases a subscription. Returns false if it was not registered.
    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        let mut by_key = self.by_key.write();
        let mut found = false;
        by_key.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub_id, _)| *sub_id != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        found
    }

    /// Invokes every callback registered for `key`.
    pub fn notify(&self, key: &str) {
        let callbacks: Vec<ChangeCallback> = match self.by_key.read().get(key) {
            Some(subs) => subs.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };

        for callback in callbacks {
            callback(key);
        }
    }

    /// Registers an external-change callback.
    pub fn subscribe_external(&self, callback: ExternalChangeCallback) -> SubscriptionId {
        let id = self.next_id();
        self.external.write().push((id, callback));
        id
    }

    /// Releases an external-change callback. Returns false if it was not registered.
    pub fn unsubscribe_external(&self, id: SubscriptionId) -> bool {
        let mut external = self.external.write();
        let before = external.len();
        external.retain(|(sub_id, _)| *sub_id != id);
        external.len() != before
    }

    /// Invokes every external-change callback with `keys`.
    pub fn notify_external(&self, keys: &BTreeSet<String>) {
        if keys.is_empty() {
            return;
        }
        let callbacks: Vec<ExternalChangeCallback> =
            self.external.read().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(keys);
        }
    }

    /// Returns the number of live per-key subscriptions.
    pub fn observer_count(&self) -> usize {
        self.by_key.read().values().map(Vec::len).sum()
    }

    /// Returns the number of live external-change subscriptions.
    pub fn external_count(&self) -> usize {
        self.external.read().len()
    }

    /// Returns the number of live subscriptions for `key`.
    pub fn observer_count_for(&self, key: &str) -> usize {
        self.by_key.read().get(key).map_or(0, Vec::len)
    }
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observer_count())
            .field("external", &self.external_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, ChangeCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let callback: ChangeCallback = Arc::new(move |_key: &str| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn notify_reaches_only_matching_key() {
        let observers = ObserverSet::new();
        let (hits, callback) = counter();
        observers.observe("theme", callback);

        observers.notify("volume");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        observers.notify("theme");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unobserve_releases_subscription() {
        let observers = ObserverSet::new();
        let (hits, callback) = counter();
        let id = observers.observe("theme", callback);
        assert_eq!(observers.observer_count(), 1);

        assert!(observers.unobserve(id));
        assert!(!observers.unobserve(id));
        assert_eq!(observers.observer_count(), 0);

        observers.notify("theme");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ids_are_unique() {
        let observers = ObserverSet::new();
        let (_, callback) = counter();
        let a = observers.observe("k", callback.clone());
        let b = observers.observe("k", callback);
        assert_ne!(a, b);
        assert_eq!(observers.observer_count_for("k"), 2);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let observers = Arc::new(ObserverSet::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> =
            Arc::new(parking_lot::Mutex::new(None));

        let observers_clone = Arc::clone(&observers);
        let slot_clone = Arc::clone(&slot);
        let id = observers.observe(
            "k",
            Arc::new(move |_key: &str| {
                if let Some(id) = slot_clone.lock().take() {
                    observers_clone.unobserve(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        observers.notify("k");
        assert_eq!(observers.observer_count(), 0);
    }

    #[test]
    fn external_skips_empty_batches() {
        let observers = ObserverSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        observers.subscribe_external(Arc::new(move |keys: &BTreeSet<String>| {
            hits_clone.fetch_add(keys.len(), Ordering::SeqCst);
        }));

        observers.notify_external(&BTreeSet::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let keys: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
        observers.notify_external(&keys);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_external_releases_callback() {
        let observers = ObserverSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let id = observers.subscribe_external(Arc::new(move |_keys: &BTreeSet<String>| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(observers.external_count(), 1);

        assert!(observers.unsubscribe_external(id));
        assert!(!observers.unsubscribe_external(id));
        assert_eq!(observers.external_count(), 0);

        observers.notify_external(&["a".to_string()].into());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn external_and_key_ids_do_not_collide() {
        let observers = ObserverSet::new();
        let (_, callback) = counter();
        let key_id = observers.observe("k", callback);
        let external_id = observers.subscribe_external(Arc::new(|_keys: &BTreeSet<String>| {}));
        assert_ne!(key_id, external_id);
    }

    #[test]
    fn observe_does_not_invoke_callback() {
        let observers = ObserverSet::new();
        let (hits, callback) = counter();
        let id = observers.observe("k", callback);
        observers.unobserve(id);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
