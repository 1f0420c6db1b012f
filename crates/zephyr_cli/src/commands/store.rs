//! Single-store commands: get, set, delete and inspect.

use super::format_timestamp;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use zephyr_store::{JsonFileStore, StoreAdapter, Value};
use zephyr_sync::{fresh_timestamp, sync_timestamp};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectOutput {
    /// Store path.
    pub path: String,
    /// Sync timestamp, if any.
    pub sync_timestamp: Option<String>,
    /// Number of user keys.
    pub key_count: usize,
    /// User keys and their JSON values.
    pub keys: BTreeMap<String, serde_json::Value>,
}

/// Prints the value of `key`.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(path)?;
    match store.get(key)? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value.to_json())?),
        None => println!("(absent)"),
    }
    Ok(())
}

/// Sets `key` from a JSON literal and stamps the store.
///
/// Input that does not parse as JSON is stored as text; `null` deletes.
pub fn set(
    path: &Path,
    key: &str,
    raw: &str,
    sync_key: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let value = parse_value(raw);
    edit(path, key, value, sync_key)
}

/// Deletes `key` and stamps the store.
pub fn delete(path: &Path, key: &str, sync_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    edit(path, key, None, sync_key)
}

/// Runs the inspect command.
pub fn inspect(path: &Path, sync_key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let output = inspect_store(path, sync_key)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            print_text_output(&output);
        }
    }

    Ok(())
}

/// Reads a store for inspection.
pub fn inspect_store(path: &Path, sync_key: &str) -> Result<InspectOutput, Box<dyn std::error::Error>> {
    let mut snapshot = JsonFileStore::open(path)?.snapshot()?;
    let ts = sync_timestamp(&snapshot, sync_key);
    snapshot.remove(sync_key);

    Ok(InspectOutput {
        path: path.display().to_string(),
        sync_timestamp: ts.map(format_timestamp),
        key_count: snapshot.len(),
        keys: snapshot
            .into_iter()
            .map(|(key, value)| (key, value.to_json()))
            .collect(),
    })
}

fn edit(
    path: &Path,
    key: &str,
    value: Option<Value>,
    sync_key: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if key == sync_key {
        return Err(format!("'{}' is reserved for the sync timestamp", sync_key).into());
    }

    let store = JsonFileStore::open_with_create_dirs(path)?;
    let floor = store.get(sync_key)?.and_then(|v| v.as_timestamp());
    let deleting = value.is_none();

    store.write(key, value)?;
    store.write(sync_key, Some(Value::Timestamp(fresh_timestamp(floor))))?;
    store.flush()?;

    tracing::debug!(key = %key, deleted = deleting, path = %path.display(), "edited store");
    Ok(())
}

fn parse_value(raw: &str) -> Option<Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(json),
        Err(_) => Some(Value::Text(raw.to_string())),
    }
}

fn print_text_output(output: &InspectOutput) {
    println!("Zephyr Store Inspection");
    println!("=======================");
    println!();
    println!("Path: {}", output.path);
    println!(
        "Sync timestamp: {}",
        output.sync_timestamp.as_deref().unwrap_or("(none)")
    );
    println!();
    println!("Keys ({}):", output.key_count);
    for (key, value) in &output.keys {
        println!("  {} = {}", key, value);
    }
}
