//! Sync command implementation.

use serde::Serialize;
use std::path::Path;
use zephyr_store::JsonFileStore;
use zephyr_sync::{SyncConfig, SyncEngine, SyncMode, SyncReport};

/// Options for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Keys to sync; empty means every key.
    pub keys: Vec<String>,
    /// Flush the remote store after pushing.
    pub flush_remote: bool,
    /// Reserved sync timestamp key.
    pub sync_key: String,
    /// Log every transferred key.
    pub debug_logging: bool,
}

/// Sync run result.
#[derive(Debug, Serialize)]
pub struct SyncOutput {
    /// Store the data was copied from.
    pub authority: String,
    /// `full` or `partial`.
    pub mode: String,
    /// Keys written.
    pub written: usize,
    /// Keys deleted.
    pub deleted: usize,
    /// Keys that failed.
    pub failed: usize,
    /// Run time in milliseconds.
    pub duration_ms: u128,
}

impl From<&SyncReport> for SyncOutput {
    fn from(report: &SyncReport) -> Self {
        Self {
            authority: report.authority.to_string(),
            mode: match report.mode {
                SyncMode::Full => "full".to_string(),
                SyncMode::Partial => "partial".to_string(),
            },
            written: report.written,
            deleted: report.deleted,
            failed: report.failed,
            duration_ms: report.duration.as_millis(),
        }
    }
}

/// Runs the sync command.
pub fn run(
    local: &Path,
    remote: &Path,
    options: &SyncOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = execute(local, remote, options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            print_text_output(&output);
        }
    }

    if output.failed > 0 {
        return Err(format!("{} key(s) failed to sync", output.failed).into());
    }
    Ok(())
}

/// Syncs two file stores and returns the outcome.
pub fn execute(
    local: &Path,
    remote: &Path,
    options: &SyncOptions,
) -> Result<SyncOutput, Box<dyn std::error::Error>> {
    let local = JsonFileStore::open_with_create_dirs(local)?;
    let remote = JsonFileStore::open_with_create_dirs(remote)?;

    let config = SyncConfig::new()
        .with_debug_logging(options.debug_logging)
        .with_flush_remote_on_every_change(options.flush_remote)
        .with_sync_key(options.sync_key.clone());
    let engine = SyncEngine::new(config, local, remote)?;

    let report = if options.keys.is_empty() {
        engine.sync()?
    } else {
        engine.sync_keys(options.keys.iter().cloned())?
    };

    // Dropping the engine flushes whatever is still dirty
    Ok(SyncOutput::from(&report))
}

fn print_text_output(output: &SyncOutput) {
    println!("Zephyr Sync");
    println!("===========");
    println!();
    println!("Mode:      {}", output.mode);
    println!("Authority: {}", output.authority);
    println!();
    println!("Keys:");
    println!("  Written: {}", output.written);
    println!("  Deleted: {}", output.deleted);
    println!("  Failed:  {}", output.failed);
    println!();
    println!("Completed in {} ms", output.duration_ms);
}
