//! CLI command implementations.

pub mod resolve;
pub mod store;
pub mod sync;

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a sync timestamp for output.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
