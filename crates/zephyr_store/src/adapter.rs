//! Store adapter capability traits.

use crate::error::StoreResult;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// A full key-to-value view of a store at one instant.
pub type Snapshot = BTreeMap<String, Value>;

/// Callback invoked with the key whose value changed.
pub type ChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked with the keys another device changed in the remote store.
pub type ExternalChangeCallback = Arc<dyn Fn(&BTreeSet<String>) + Send + Sync>;

/// Handle for one per-key observation registered with a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Uniform interface over one physical key-value store.
///
/// Adapters own their own change-notification mechanism; the engine only
/// registers and releases per-key callbacks through [`observe`](Self::observe)
/// and [`unobserve`](Self::unobserve).
///
/// # Invariants
///
/// - `write(key, None)` behaves exactly like `delete(key)`
/// - Deleting a missing key succeeds
/// - Observers registered for a key fire after every `write`/`delete` of
///   that key, on the writing thread, with no adapter lock held
/// - `observe` and `unobserve` never invoke a callback themselves; callers
///   may hold their own locks across them
/// - Adapters must be `Send + Sync`
pub trait StoreAdapter: Send + Sync {
    /// Returns every key and value currently in the store.
    fn snapshot(&self) -> StoreResult<Snapshot>;

    /// Reads a single key.
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.snapshot()?.remove(key))
    }

    /// Writes a value; `None` deletes the key.
    fn write(&self, key: &str, value: Option<Value>) -> StoreResult<()>;

    /// Deletes a key.
    fn delete(&self, key: &str) -> StoreResult<()> {
        self.write(key, None)
    }

    /// Starts delivering change callbacks for `key`.
    fn observe(&self, key: &str, callback: ChangeCallback) -> StoreResult<SubscriptionId>;

    /// Stops delivering callbacks for a subscription.
    ///
    /// Releasing an unknown subscription is a no-op.
    fn unobserve(&self, id: SubscriptionId);

    /// Forces pending writes to be persisted or propagated now.
    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// A store whose contents are also changed by other devices.
pub trait RemoteStore: StoreAdapter {
    /// Registers a callback for batches of keys changed externally.
    ///
    /// Writes made through this adapter never trigger the callback.
    fn subscribe_external_changes(
        &self,
        callback: ExternalChangeCallback,
    ) -> StoreResult<SubscriptionId>;

    /// Releases an external-change subscription.
    ///
    /// Releasing an unknown subscription is a no-op.
    fn unsubscribe_external_changes(&self, id: SubscriptionId);
}
