//! # Zephyr Store
//!
//! Key-value store adapters and the value model for Zephyr.
//!
//! This crate provides the store-facing half of Zephyr. The sync engine in
//! `zephyr_sync` never talks to a concrete store; it only sees the
//! [`StoreAdapter`] and [`RemoteStore`] capabilities defined here.
//!
//! ## Design Principles
//!
//! - Stores are flat `String -> Value` maps
//! - Deletion is a write of `None`, never an error
//! - Per-key observation is a capability of the adapter, not of the engine
//! - Adapters must be `Send + Sync` for use from the sync worker
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral state
//! - [`JsonFileStore`] - Persistent store backed by a JSON document
//!
//! ## Example
//!
//! ```rust
//! use zephyr_store::{MemoryStore, StoreAdapter, Value};
//!
//! let store = MemoryStore::new();
//! store.write("theme", Some(Value::from("dark"))).unwrap();
//! assert_eq!(store.get("theme").unwrap(), Some(Value::from("dark")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod adapter;
mod error;
mod file;
mod memory;
mod observers;
mod value;

pub use adapter::{
    ChangeCallback, ExternalChangeCallback, RemoteStore, Snapshot, StoreAdapter, SubscriptionId,
};
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use observers::ObserverSet;
pub use value::Value;
