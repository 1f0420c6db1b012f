//! Zephyr CLI
//!
//! Command-line tools for Zephyr JSON stores.
//!
//! # Commands
//!
//! - `sync` - Sync two stores, fully or for selected keys
//! - `resolve` - Show which store would win a sync
//! - `get` / `set` / `delete` - Read and edit a single key
//! - `inspect` - List the keys and sync timestamp of a store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zephyr_sync::DEFAULT_SYNC_KEY;

/// Zephyr key-value sync tools.
#[derive(Parser)]
#[command(name = "zephyr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output, including every transferred key
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Reserved key holding each store's sync timestamp
    #[arg(global = true, long, default_value = DEFAULT_SYNC_KEY)]
    sync_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a local store with a remote store
    Sync {
        /// Path to the local store
        #[arg(short, long)]
        local: PathBuf,

        /// Path to the remote store
        #[arg(short, long)]
        remote: PathBuf,

        /// Only sync these keys (repeatable)
        #[arg(short, long = "key")]
        keys: Vec<String>,

        /// Do not flush the remote store after pushing
        #[arg(long)]
        no_flush: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show which store is authoritative
    Resolve {
        /// Path to the local store
        #[arg(short, long)]
        local: PathBuf,

        /// Path to the remote store
        #[arg(short, long)]
        remote: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the value of a key
    Get {
        /// Path to the store
        #[arg(short, long)]
        store: PathBuf,

        /// Key to read
        key: String,
    },

    /// Set a key to a JSON value and stamp the store
    Set {
        /// Path to the store
        #[arg(short, long)]
        store: PathBuf,

        /// Key to write
        key: String,

        /// JSON value; anything that is not valid JSON is stored as text
        value: String,
    },

    /// Delete a key and stamp the store
    Delete {
        /// Path to the store
        #[arg(short, long)]
        store: PathBuf,

        /// Key to delete
        key: String,
    },

    /// Display the keys and sync timestamp of a store
    Inspect {
        /// Path to the store
        #[arg(short, long)]
        store: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            local,
            remote,
            keys,
            no_flush,
            format,
        } => {
            let options = commands::sync::SyncOptions {
                keys,
                flush_remote: !no_flush,
                sync_key: cli.sync_key,
                debug_logging: cli.verbose,
            };
            commands::sync::run(&local, &remote, &options, &format)?;
        }
        Commands::Resolve {
            local,
            remote,
            format,
        } => {
            commands::resolve::run(&local, &remote, &cli.sync_key, &format)?;
        }
        Commands::Get { store, key } => {
            commands::store::get(&store, &key)?;
        }
        Commands::Set { store, key, value } => {
            commands::store::set(&store, &key, &value, &cli.sync_key)?;
        }
        Commands::Delete { store, key } => {
            commands::store::delete(&store, &key, &cli.sync_key)?;
        }
        Commands::Inspect { store, format } => {
            commands::store::inspect(&store, &cli.sync_key, &format)?;
        }
        Commands::Version => {
            println!("Zephyr CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
