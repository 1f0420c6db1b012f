//! Error types for the sync engine.

use thiserror::Error;
use zephyr_store::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced to callers of the engine.
///
/// Individual store failures during a sync are best-effort: they are logged
/// and counted in the [`SyncReport`](crate::SyncReport), not returned here.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A store could not be read or subscribed to, so the operation did not start.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The engine has been shut down and accepts no more work.
    #[error("sync engine stopped")]
    EngineStopped,

    /// A queued task panicked.
    #[error("sync task failed: {0}")]
    TaskFailed(String),

    /// The worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
