//! Reports and counters for sync runs.

use crate::resolver::Authority;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whether a run covered every key or an explicit list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Every key in either store.
    Full,
    /// An explicit key list.
    Partial,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Store the data was copied from.
    pub authority: Authority,
    /// Full or partial run.
    pub mode: SyncMode,
    /// Keys written to the destination.
    pub written: usize,
    /// Keys deleted from the destination.
    pub deleted: usize,
    /// Keys whose write or delete failed.
    pub failed: usize,
    /// Wall time spent in the run.
    pub duration: Duration,
}

impl SyncReport {
    pub(crate) fn new(authority: Authority, mode: SyncMode) -> Self {
        Self {
            authority,
            mode,
            written: 0,
            deleted: 0,
            failed: 0,
            duration: Duration::ZERO,
        }
    }

    /// Direction the data flowed in.
    pub fn destination(&self) -> Authority {
        self.authority.opposite()
    }

    /// Number of keys transferred, successfully or not.
    pub fn touched(&self) -> usize {
        self.written + self.deleted + self.failed
    }

    /// Returns true if no key failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Cumulative statistics for an engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Full syncs completed.
    pub full_syncs: u64,
    /// Partial syncs completed.
    pub partial_syncs: u64,
    /// Keys written to the remote store.
    pub keys_pushed: u64,
    /// Keys written to the local store.
    pub keys_pulled: u64,
    /// Keys deleted from either store.
    pub keys_deleted: u64,
    /// Store writes that failed.
    pub write_failures: u64,
    /// External-change notifications acted on.
    pub notifications_applied: u64,
    /// External-change notifications ignored as stale.
    pub notifications_ignored: u64,
    /// When the last run finished.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Authority of the last run.
    pub last_authority: Option<Authority>,
}

impl SyncStats {
    pub(crate) fn record(&mut self, report: &SyncReport) {
        match report.mode {
            SyncMode::Full => self.full_syncs += 1,
            SyncMode::Partial => self.partial_syncs += 1,
        }
        match report.destination() {
            Authority::Remote => self.keys_pushed += report.written as u64,
            Authority::Local => self.keys_pulled += report.written as u64,
        }
        self.keys_deleted += report.deleted as u64;
        self.write_failures += report.failed as u64;
        self.last_sync_time = Some(Utc::now());
        self.last_authority = Some(report.authority);
    }
}
