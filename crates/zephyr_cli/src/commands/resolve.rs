//! Resolve command implementation.

use super::format_timestamp;
use serde::Serialize;
use std::path::Path;
use zephyr_store::{JsonFileStore, StoreAdapter};
use zephyr_sync::{resolve_timestamps, sync_timestamp};

/// Resolution result.
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    /// Store that would win a sync.
    pub authority: String,
    /// Local sync timestamp, if any.
    pub local_timestamp: Option<String>,
    /// Remote sync timestamp, if any.
    pub remote_timestamp: Option<String>,
}

/// Runs the resolve command.
pub fn run(
    local: &Path,
    remote: &Path,
    sync_key: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = execute(local, remote, sync_key)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            let none = "(none)".to_string();
            println!("Authority: {}", output.authority);
            println!(
                "  Local:  {}",
                output.local_timestamp.as_ref().unwrap_or(&none)
            );
            println!(
                "  Remote: {}",
                output.remote_timestamp.as_ref().unwrap_or(&none)
            );
        }
    }

    Ok(())
}

/// Compares the sync timestamps of two file stores.
pub fn execute(
    local: &Path,
    remote: &Path,
    sync_key: &str,
) -> Result<ResolveOutput, Box<dyn std::error::Error>> {
    let local = JsonFileStore::open(local)?.snapshot()?;
    let remote = JsonFileStore::open(remote)?.snapshot()?;

    let local_ts = sync_timestamp(&local, sync_key);
    let remote_ts = sync_timestamp(&remote, sync_key);

    Ok(ResolveOutput {
        authority: resolve_timestamps(local_ts, remote_ts).to_string(),
        local_timestamp: local_ts.map(format_timestamp),
        remote_timestamp: remote_ts.map(format_timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use zephyr_store::Value;
    use zephyr_sync::DEFAULT_SYNC_KEY;

    fn store_at(path: &Path, secs: Option<i64>) {
        let store = JsonFileStore::open(path).unwrap();
        if let Some(secs) = secs {
            let ts = Utc.timestamp_opt(secs, 0).unwrap();
            store.write(DEFAULT_SYNC_KEY, Some(Value::Timestamp(ts))).unwrap();
        }
        store.flush().unwrap();
    }

    #[test]
    fn newer_store_wins() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("local.json");
        let remote = dir.path().join("remote.json");
        store_at(&local, Some(200));
        store_at(&remote, Some(100));

        let output = execute(&local, &remote, DEFAULT_SYNC_KEY).unwrap();
        assert_eq!(output.authority, "local");
        assert_eq!(
            output.local_timestamp.as_deref(),
            Some("1970-01-01T00:03:20.000000Z")
        );
    }

    #[test]
    fn tie_and_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("local.json");
        let remote = dir.path().join("remote.json");

        let output = execute(&local, &remote, DEFAULT_SYNC_KEY).unwrap();
        assert_eq!(output.authority, "local");
        assert_eq!(output.remote_timestamp, None);

        store_at(&local, Some(50));
        store_at(&remote, Some(50));
        let output = execute(&local, &remote, DEFAULT_SYNC_KEY).unwrap();
        assert_eq!(output.authority, "remote");
    }
}
