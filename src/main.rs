//! # Pressroom CLI (`press`)
//!
//! The `press` binary is the operator interface for Pressroom. It provides
//! commands for store initialization, publishing, inspection, index
//! recovery, and lock management.
//!
//! ## Usage
//!
//! ```bash
//! press --config ./config/press.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `press init` | Create the store layout and empty index/ledger files |
//! | `press publish <file>` | Validate and publish a candidate document |
//! | `press get <slug>` | Print a stored document and its listing state |
//! | `press list` | List indexed documents |
//! | `press rebuild` | Rebuild the listing index from the documents on disk |
//! | `press check` | Read-only integrity check across index, ledger, and corpus |
//! | `press stats` | Publishing counters and recent outcomes |
//! | `press lock status` | Show the index lock marker |
//! | `press lock release` | Force-release an abandoned index lock |
//!
//! ## Examples
//!
//! ```bash
//! # Prepare a fresh store
//! press init --config ./config/press.toml
//!
//! # Publish a generated candidate, see what would happen first
//! press publish ./out/backup-strategies.json --dry-run
//! press publish ./out/backup-strategies.json
//!
//! # Regenerated content for an already-published topic
//! press publish ./out/backup-strategies.json --force --overwrite
//!
//! # Recover after a crash or hand-edited files
//! press check
//! press rebuild --with-ledger
//! ```

mod atomic;
mod check;
mod config;
mod error;
mod gate;
mod get;
mod index;
mod init;
mod ledger;
mod list;
mod lock;
mod metrics;
mod models;
mod notify;
mod publish;
mod rebuild;
mod stats;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pressroom CLI — a crash-safe file-backed publishing core for generated
/// content.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/press.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "press",
    about = "Pressroom — a crash-safe publishing core for generated content",
    version,
    long_about = "Pressroom stores generated documents as one JSON file per slug, maintains a \
    derived listing index and a topic deduplication ledger, and guards every index mutation with \
    a cross-process lock. Interrupted publishes never leave torn files; the index can always be \
    rebuilt from the documents on disk."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/press.toml`. The store root, lock timings,
    /// validation rules, and cache invalidation settings are read from
    /// this file.
    #[arg(long, global = true, default_value = "./config/press.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store layout.
    ///
    /// Creates the documents directory and seeds empty index, ledger, and
    /// metrics files. Idempotent — existing files are never touched.
    Init,

    /// Publish a candidate document from a JSON file.
    ///
    /// Runs validation, reserves the topic in the deduplication ledger,
    /// writes the document atomically, updates the listing index under
    /// the cross-process lock, and notifies the cache invalidator.
    /// Pass `-` to read the candidate from stdin.
    Publish {
        /// Path to the candidate JSON file (`-` for stdin).
        file: PathBuf,

        /// Republish a topic that is already published.
        #[arg(long)]
        force: bool,

        /// Replace an existing document file for the same slug.
        #[arg(long)]
        overwrite: bool,

        /// Report what would happen without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve a document by its slug.
    ///
    /// Prints the document's metadata, body, and whether the listing
    /// index currently carries an entry for it.
    Get {
        /// Document slug.
        slug: String,
    },

    /// List all indexed documents.
    List {
        /// Emit the full index as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the listing index from the documents on disk.
    ///
    /// Scans every document file, revalidates it, and atomically replaces
    /// the index with the derived result. Running it twice in a row
    /// produces byte-identical output.
    Rebuild {
        /// Scan and classify only; write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Also rebuild the deduplication ledger from the documents.
        #[arg(long)]
        with_ledger: bool,
    },

    /// Read-only integrity check.
    ///
    /// Reads the index and ledger strictly (corruption is reported, not
    /// repaired), rescans the corpus, and reports drift. Exits nonzero
    /// when problems are found.
    Check,

    /// Publishing counters and recent outcomes.
    Stats,

    /// Inspect or force-release the index lock.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
}

/// Lock management subcommands.
#[derive(Subcommand)]
enum LockAction {
    /// Show the current lock marker, its holder, and its age.
    Status,

    /// Force-delete the lock marker.
    ///
    /// Only safe when no publisher is running; a crashed publisher's
    /// marker is also reclaimed automatically once it goes stale.
    Release,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            init::run_init(&cfg).await?;
        }
        Commands::Publish {
            file,
            force,
            overwrite,
            dry_run,
        } => {
            publish::run_publish(&cfg, &file, force, overwrite, dry_run).await?;
        }
        Commands::Get { slug } => {
            get::run_get(&cfg, &slug).await?;
        }
        Commands::List { json } => {
            list::run_list(&cfg, json).await?;
        }
        Commands::Rebuild {
            dry_run,
            with_ledger,
        } => {
            rebuild::run_rebuild(&cfg, dry_run, with_ledger).await?;
        }
        Commands::Check => {
            check::run_check(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Lock { action } => match action {
            LockAction::Status => {
                lock::run_lock_status(&cfg).await?;
            }
            LockAction::Release => {
                lock::run_lock_release(&cfg).await?;
            }
        },
    }

    Ok(())
}
