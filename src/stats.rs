//! Publishing statistics and store health overview.
//!
//! Provides a quick summary of the store: document and index counts,
//! ledger coverage, publish attempt counters, failure breakdowns, and
//! recent outcomes. Used by `press stats` to give confidence that
//! publishes are landing and failures are visible.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::index::ListingIndexStore;
use crate::ledger::{DedupLedger, PublishStatus};
use crate::metrics::MetricsRecorder;
use crate::store::DocumentStore;

/// Run the stats command: gather counters and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = DocumentStore::from_config(config);
    let index_store = ListingIndexStore::from_config(config);
    let ledger_store = DedupLedger::from_config(config);
    let recorder = MetricsRecorder::from_config(config);

    let documents = store.count().context("failed to scan document store")?;
    let index = index_store.load().await.context("failed to load index")?;
    let ledger = ledger_store.read_raw().context("failed to read ledger")?;
    let (topics, pending) = match &ledger {
        Some(ledger) => (
            ledger.records.len(),
            ledger
                .records
                .values()
                .filter(|r| r.status == PublishStatus::Pending)
                .count(),
        ),
        None => (0, 0),
    };
    let snapshot = recorder.snapshot();

    println!("Pressroom — Store Stats");
    println!("=======================");
    println!();
    println!("  Store:       {}", config.store.root.display());
    println!("  Size:        {}", format_bytes(store_size(config)));
    println!();
    println!("  Documents:   {}", documents);
    println!("  Indexed:     {}", index.len());
    println!("  Topics:      {}", topics);
    if pending > 0 {
        println!("  Pending:     {}", pending);
    }
    println!();
    println!("  Attempts:    {}", snapshot.attempts);
    println!("  Published:   {}", snapshot.published);
    println!(
        "  Failed:      {}",
        snapshot.attempts.saturating_sub(snapshot.published)
    );
    println!("  Notify errs: {}", snapshot.notify_failures);

    if !snapshot.failures_by_code.is_empty() {
        println!();
        println!("  By failure code:");
        println!("  {:<30} {:>6}", "CODE", "COUNT");
        println!("  {}", "-".repeat(38));
        for (code, count) in &snapshot.failures_by_code {
            println!("  {:<30} {:>6}", code, count);
        }
    }

    if !snapshot.top_failures.is_empty() {
        println!();
        println!("  Top failing topics:");
        println!("  {:<30} {:>6}", "TOPIC", "COUNT");
        println!("  {}", "-".repeat(38));
        let mut ranked: Vec<(&String, &u64)> = snapshot.top_failures.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (topic, count) in ranked {
            println!("  {:<30} {:>6}", topic, count);
        }
    }

    if !snapshot.recent.is_empty() {
        println!();
        println!("  Recent outcomes:");
        for event in snapshot.recent.iter().rev().take(10) {
            let code = event.code.as_deref().unwrap_or("-");
            println!(
                "  {:<14} {:<14} {:<28} {}",
                format_ts_relative(event.at),
                event.kind.label(),
                event.slug,
                code
            );
        }
    }

    println!();
    Ok(())
}

/// Total size of everything under the store root: document files plus the
/// index, ledger, and metrics files.
fn store_size(config: &Config) -> u64 {
    let mut total = 0;
    if let Ok(entries) = std::fs::read_dir(config.documents_dir()) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    for path in [
        config.index_path(),
        config.ledger_path(),
        config.metrics_path(),
    ] {
        if let Ok(meta) = std::fs::metadata(path) {
            total += meta.len();
        }
    }
    total
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(at: DateTime<Utc>) -> String {
    let delta = Utc::now().signed_duration_since(at).num_seconds();

    if delta < 0 {
        return at.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        at.format("%Y-%m-%d %H:%M").to_string()
    }
}
