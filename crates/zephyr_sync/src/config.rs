//! Configuration for the sync engine.

use serde::Deserialize;

/// Default name of the reserved key holding each store's sync timestamp.
pub const DEFAULT_SYNC_KEY: &str = "ZephyrSyncKey";

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
///
/// Can be built in code or deserialized from a host's settings file; every
/// field is optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Log every transferred key at `info` level instead of `trace`.
    pub debug_logging: bool,
    /// Ask the remote store to flush after each push.
    pub flush_remote_on_every_change: bool,
    /// Reserved key holding the sync timestamp in both stores.
    pub sync_key: String,
}

impl SyncConfig {
    /// Creates a configuration with the defaults.
    pub fn new() -> Self {
        Self {
            debug_logging: false,
            flush_remote_on_every_change: true,
            sync_key: DEFAULT_SYNC_KEY.to_string(),
        }
    }

    /// Enables or disables per-key debug logging.
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Sets whether the remote store is flushed after each push.
    pub fn with_flush_remote_on_every_change(mut self, enabled: bool) -> Self {
        self.flush_remote_on_every_change = enabled;
        self
    }

    /// Overrides the reserved sync timestamp key.
    pub fn with_sync_key(mut self, key: impl Into<String>) -> Self {
        self.sync_key = key.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
