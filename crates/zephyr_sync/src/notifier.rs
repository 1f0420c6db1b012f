//! Lifecycle events and the handlers that turn store notifications into
//! queued sync work.

use crate::engine::EngineCore;
use crate::error::{SyncError, SyncResult};
use crate::resolver::{sync_timestamp, Authority};
use crate::stats::SyncMode;
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use zephyr_store::{RemoteStore, StoreAdapter};

/// An event from the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application returned to the foreground.
    ///
    /// The engine asks the remote store to refresh.
    AppResumed,
    /// The remote store changed from another device.
    ///
    /// Carries the keys reported as changed.
    ExternalChange(BTreeSet<String>),
}

/// What travels over the listener channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EventMessage {
    Event(LifecycleEvent),
    /// Ends the listener loop.
    Stop,
}

/// Delivers [`LifecycleEvent`]s to an engine from any thread.
///
/// Obtained from [`SyncEngine::event_sender`](crate::SyncEngine::event_sender).
/// Cloning is cheap.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: Sender<EventMessage>,
}

impl EventSender {
    pub(crate) fn new(inner: Sender<EventMessage>) -> Self {
        Self { inner }
    }

    /// Sends an event.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EngineStopped` once the engine has been shut
    /// down or dropped.
    pub fn send(&self, event: LifecycleEvent) -> SyncResult<()> {
        self.inner
            .send(EventMessage::Event(event))
            .map_err(|_| SyncError::EngineStopped)
    }

    /// Sends [`LifecycleEvent::AppResumed`].
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn app_resumed(&self) -> SyncResult<()> {
        self.send(LifecycleEvent::AppResumed)
    }

    /// Sends [`LifecycleEvent::ExternalChange`] for `keys`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub fn external_change<I, K>(&self, keys: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.send(LifecycleEvent::ExternalChange(
            keys.into_iter().map(Into::into).collect(),
        ))
    }
}

impl<L, R> EngineCore<L, R>
where
    L: StoreAdapter + 'static,
    R: RemoteStore + 'static,
{
    /// Queues the work for a lifecycle event.
    pub(crate) fn handle_event(self: &Arc<Self>, event: LifecycleEvent) -> SyncResult<()> {
        let core = Arc::clone(self);
        match event {
            LifecycleEvent::AppResumed => self.queue.submit(move || core.refresh_remote()),
            LifecycleEvent::ExternalChange(keys) => {
                self.queue.submit(move || core.apply_external_change(&keys))
            }
        }
    }

    /// Called by the local store when a subscribed key changes.
    ///
    /// Stamps the local sync timestamp right away so the change wins any
    /// resolution that runs before the queued push.
    pub(crate) fn on_local_change(self: &Arc<Self>, key: &str) {
        if key == self.sync_key || !self.monitor.is_subscribed(key) {
            return;
        }
        if self.queue.is_shut_down() || self.monitor.is_torn_down() {
            tracing::debug!(key = %key, "ignoring local change after shutdown");
            return;
        }

        let floor = match self.local.get(&self.sync_key) {
            Ok(value) => value.and_then(|v| v.as_timestamp()),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read local sync timestamp");
                None
            }
        };
        self.stamp(&*self.local, floor);

        let core = Arc::clone(self);
        let keys = vec![key.to_string()];
        let submitted = self.queue.submit(move || {
            if let Err(e) = core.transfer_keys(Authority::Local, &keys) {
                tracing::warn!(error = %e, "failed to push local change");
            }
        });
        if let Err(e) = submitted {
            tracing::debug!(key = %key, error = %e, "dropping local change");
        }
    }

    /// Pulls the reported keys if the remote store is strictly newer.
    pub(crate) fn apply_external_change(&self, keys: &BTreeSet<String>) {
        let start = Instant::now();
        let (local, remote) = match self.snapshots() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stores for external change");
                return;
            }
        };

        let local_ts = sync_timestamp(&local, &self.sync_key);
        let remote_ts = sync_timestamp(&remote, &self.sync_key);
        let remote_is_newer = match (remote_ts, local_ts) {
            (Some(r), Some(l)) => r > l,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !remote_is_newer {
            self.stats.write().notifications_ignored += 1;
            tracing::debug!(
                keys = keys.len(),
                ?local_ts,
                ?remote_ts,
                "ignoring stale external change"
            );
            return;
        }
        self.stats.write().notifications_applied += 1;

        let relevant: Vec<String> = keys
            .iter()
            .filter(|key| **key != self.sync_key && self.monitor.is_monitored(key))
            .cloned()
            .collect();
        if relevant.is_empty() {
            tracing::debug!(keys = keys.len(), "external change touched no monitored keys");
            return;
        }

        self.transfer(
            Authority::Remote,
            SyncMode::Partial,
            &relevant,
            &local,
            &remote,
            start,
        );
    }

    /// Asks the remote store to refresh.
    fn refresh_remote(&self) {
        match self.remote.flush() {
            Ok(()) => tracing::debug!("refreshed remote store"),
            Err(e) => tracing::warn!(error = %e, "failed to refresh remote store"),
        }
    }
}
