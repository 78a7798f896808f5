//! Listing of indexed documents.

use anyhow::Result;

use crate::config::Config;
use crate::get::format_ts;
use crate::index::ListingIndexStore;

/// CLI entry point for `press list`. Human-readable table by default,
/// the full index document with `--json`.
pub async fn run_list(config: &Config, json: bool) -> Result<()> {
    let index = ListingIndexStore::from_config(config).load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    if index.is_empty() {
        println!("No documents in the index.");
        return Ok(());
    }

    println!(
        "{} entries, index updated {}",
        index.len(),
        format_ts(&index.updated_at)
    );
    println!();
    println!("{:<32} {:<14} {:<21} TITLE", "SLUG", "CATEGORY", "UPDATED");
    for entry in &index.entries {
        println!(
            "{:<32} {:<14} {:<21} {}",
            entry.slug,
            entry.category,
            format_ts(&entry.updated_at),
            entry.title
        );
    }

    Ok(())
}
