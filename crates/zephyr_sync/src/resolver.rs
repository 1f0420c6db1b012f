//! Conflict resolution between the two stores.
//!
//! Resolution is last-writer-wins at store granularity: whichever store
//! carries the newer sync timestamp is authoritative for the whole sync.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use zephyr_store::Snapshot;

/// The store whose data wins a sync decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    /// The device-local store.
    Local,
    /// The cloud-synchronized store.
    Remote,
}

impl Authority {
    /// Returns the other store.
    pub fn opposite(self) -> Self {
        match self {
            Authority::Local => Authority::Remote,
            Authority::Remote => Authority::Local,
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Local => f.write_str("local"),
            Authority::Remote => f.write_str("remote"),
        }
    }
}

/// Reads the sync timestamp from a snapshot.
///
/// An entry that is not a timestamp counts as absent.
pub fn sync_timestamp(snapshot: &Snapshot, sync_key: &str) -> Option<DateTime<Utc>> {
    snapshot.get(sync_key).and_then(|v| v.as_timestamp())
}

/// Picks the authoritative store from two snapshots.
pub fn resolve(local: &Snapshot, remote: &Snapshot, sync_key: &str) -> Authority {
    resolve_timestamps(
        sync_timestamp(local, sync_key),
        sync_timestamp(remote, sync_key),
    )
}

/// Picks the authoritative store from the two sync timestamps.
///
/// | local | remote | result |
/// |-------|--------|--------|
/// | `Some(l)` | `Some(r)` | `Local` iff `l > r` |
/// | `Some(_)` | `None` | `Local` |
/// | `None` | `Some(_)` | `Remote` |
/// | `None` | `None` | `Local` |
///
/// Equal timestamps resolve to `Remote`.
pub fn resolve_timestamps(
    local: Option<DateTime<Utc>>,
    remote: Option<DateTime<Utc>>,
) -> Authority {
    match (local, remote) {
        (Some(l), Some(r)) if l > r => Authority::Local,
        (Some(_), Some(_)) => Authority::Remote,
        (_, None) => Authority::Local,
        (None, Some(_)) => Authority::Remote,
    }
}

/// Returns a timestamp to stamp into a store.
///
/// The result is the current time, or one microsecond past `floor` if the
/// clock has not moved beyond it.
pub fn fresh_timestamp(floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match floor {
        Some(floor) if now <= floor => floor + Duration::microseconds(1),
        _ => now,
    }
}
