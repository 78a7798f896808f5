//! One-time store initialization.
//!
//! Creates the directory layout and seeds empty index, ledger, and
//! metrics files. Idempotent: anything that already exists is left
//! untouched, so running `press init` against a live store is safe.

use std::path::Path;

use anyhow::{Context, Result};

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::index::ListingIndex;
use crate::ledger::Ledger;
use crate::metrics::MetricsRecord;

/// CLI entry point for `press init`.
pub async fn run_init(config: &Config) -> Result<()> {
    let documents = config.documents_dir();
    if documents.is_dir() {
        println!("kept    {}", documents.display());
    } else {
        std::fs::create_dir_all(&documents)
            .with_context(|| format!("failed to create {}", documents.display()))?;
        println!("created {}", documents.display());
    }

    seed(&config.index_path(), || ListingIndex::empty().to_bytes())?;
    seed(&config.ledger_path(), || Ledger::empty().to_bytes())?;
    seed(&config.metrics_path(), || {
        let mut bytes = serde_json::to_vec_pretty(&MetricsRecord::empty())?;
        bytes.push(b'\n');
        Ok::<_, serde_json::Error>(bytes)
    })?;

    println!();
    println!("Store ready at {}", config.store.root.display());
    Ok(())
}

/// Write a seed file only when the path does not exist yet.
fn seed<E>(path: &Path, make: impl FnOnce() -> Result<Vec<u8>, E>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    if path.exists() {
        println!("kept    {}", path.display());
        return Ok(());
    }
    let bytes = make().context("failed to serialize seed file")?;
    write_atomic(path, &bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("created {}", path.display());
    Ok(())
}
