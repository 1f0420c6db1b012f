//! JSON-file store for persistent state.

use crate::adapter::{
    ChangeCallback, ExternalChangeCallback, RemoteStore, Snapshot, StoreAdapter, SubscriptionId,
};
use crate::error::{StoreError, StoreResult};
use crate::observers::ObserverSet;
use crate::value::Value;
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// A store persisted as a single JSON document.
///
/// The whole snapshot lives in memory; `flush()` rewrites the document
/// atomically (temp file, `sync_all`, rename). Unflushed writes are flushed
/// when the store is dropped.
///
/// Numbers must be finite; JSON has no encoding for NaN or infinity, so
/// such writes fail with [`StoreError::UnsupportedValue`].
///
/// # Locking
///
/// An exclusive advisory lock on `<file>.lock` is held for the lifetime of
/// the store, so two processes can never interleave writes to one document.
/// Because of that lock, a file store has no writers other than itself and
/// its external-change subscribers are never notified.
///
/// # Example
///
/// ```no_run
/// use zephyr_store::{JsonFileStore, StoreAdapter, Value};
/// use std::path::Path;
///
/// let store = JsonFileStore::open(Path::new("prefs.json")).unwrap();
/// store.write("theme", Some(Value::from("dark"))).unwrap();
/// store.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<Snapshot>,
    dirty: AtomicBool,
    observers: ObserverSet,
    _lock_file: File,
}

impl JsonFileStore {
    /// Opens or creates a store at `path`.
    ///
    /// A missing or empty file is an empty store; the document is only
    /// created on the first flush.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`StoreError::Locked`)
    /// - The existing document is not valid JSON
    /// - An I/O error occurs
    pub fn open(path: &Path) -> StoreResult<Self> {
        let lock_path = lock_path_for(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path.to_path_buf()));
        }

        let data = load_snapshot(path)?;
        tracing::debug!(path = %path.display(), keys = data.len(), "opened json store");

        Ok(Self {
            path: path.to_path_buf(),
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
            observers: ObserverSet::new(),
            _lock_file: lock_file,
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the store
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::open(path)
    }

    /// Returns the path to the JSON document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if there are writes not yet flushed to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn persist(&self) -> StoreResult<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let data = self.data.read();
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &*data)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl StoreAdapter for JsonFileStore {
    fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(self.data.read().clone())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: Option<Value>) -> StoreResult<()> {
        if value.as_ref().is_some_and(|v| !v.is_finite()) {
            return Err(StoreError::UnsupportedValue {
                key: key.to_string(),
                reason: "JSON cannot encode NaN or infinite numbers".to_string(),
            });
        }

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
        self.dirty.store(true, Ordering::SeqCst);
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
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.persist() {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }
}

impl RemoteStore for JsonFileStore {
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

impl Drop for JsonFileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush json store on drop");
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

fn load_snapshot(path: &Path) -> StoreResult<Snapshot> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(Snapshot::new());
    }
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn file_open_missing_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.snapshot().unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.write("theme", Some(Value::from("dark"))).unwrap();
            store.write("volume", Some(Value::from(7))).unwrap();
            store.flush().unwrap();
            assert!(!store.is_dirty());
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("theme").unwrap(), Some(Value::from("dark")));
        assert_eq!(store.get("volume").unwrap(), Some(Value::from(7)));
    }

    #[test]
    fn file_flushes_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.write("theme", Some(Value::from("light"))).unwrap();
            assert!(store.is_dirty());
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("theme").unwrap(), Some(Value::from("light")));
    }

    #[test]
    fn file_lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let _store = JsonFileStore::open(&path).unwrap();
        let second = JsonFileStore::open(&path);
        assert!(matches!(second, Err(StoreError::Locked(_))));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        drop(JsonFileStore::open(&path).unwrap());
        assert!(JsonFileStore::open(&path).is_ok());
    }

    #[test]
    fn file_rejects_corrupt_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, b"{not json").unwrap();

        let result = JsonFileStore::open(&path);
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn file_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("prefs.json");

        let store = JsonFileStore::open_with_create_dirs(&path).unwrap();
        store.write("a", Some(Value::from(true))).unwrap();
        store.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn file_observer_fires_on_write() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(&dir.path().join("prefs.json")).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        store
            .observe(
                "theme",
                Arc::new(move |_key: &str| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.write("theme", Some(Value::from("dark"))).unwrap();
        store.delete("theme").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/data/prefs.json")),
            PathBuf::from("/data/prefs.json.lock")
        );
    }
}
