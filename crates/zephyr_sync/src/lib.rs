//! # Zephyr Sync
//!
//! Keeps a device-local key-value store and a cloud-synchronized one
//! eventually consistent.
//!
//! ## Model
//!
//! Each store carries a sync timestamp under a reserved key
//! ([`DEFAULT_SYNC_KEY`] unless configured otherwise). A sync compares the
//! two timestamps and copies data from the newer store, the *authority*,
//! into the other. Equal timestamps favor the remote store.
//!
//! - **Full sync** transfers every key present in either store
//! - **Partial sync** transfers a given set of keys
//! - **Monitored keys** push to the remote store whenever they change locally
//! - **External changes** pull monitored keys when the remote store is newer
//!
//! All sync work runs one task at a time on a dedicated worker thread, so
//! runs never interleave.
//!
//! ## Example
//!
//! ```rust
//! use zephyr_store::{MemoryStore, StoreAdapter, Value};
//! use zephyr_sync::{Authority, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(SyncConfig::default(), MemoryStore::new(), MemoryStore::new()).unwrap();
//! engine.monitor(["volume"]);
//!
//! engine.local().write("volume", Some(Value::from(7))).unwrap();
//! engine.wait_for_pending().unwrap();
//!
//! assert_eq!(engine.remote().get("volume").unwrap(), Some(Value::from(7)));
//! assert_eq!(engine.stats().last_authority, Some(Authority::Local));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod engine;
mod error;
mod monitor;
mod notifier;
mod queue;
mod resolver;
mod stats;

pub use config::{SyncConfig, DEFAULT_SYNC_KEY};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use monitor::{KeyMonitor, SuspendGuard};
pub use notifier::{EventSender, LifecycleEvent};
pub use queue::SerialQueue;
pub use resolver::{fresh_timestamp, resolve, resolve_timestamps, sync_timestamp, Authority};
pub use stats::{SyncMode, SyncReport, SyncStats};
