//! Index rebuilder / recovery.
//!
//! The document store is the source of truth; the listing index and the
//! dedup ledger are both derivable from it. The rebuilder scans every
//! document file, classifies it (valid, invalid, quarantined, excluded),
//! constructs a brand-new index in memory, and swaps it in with a single
//! locked atomic write. It never mutates the existing index in place.
//!
//! The scan itself runs without the lock, so publishes are not blocked
//! while a large corpus is read. A document committed after the scan
//! passed its slug may or may not appear in the rebuilt index; rebuild is
//! a repair tool, not a consistency barrier, and the next publish or the
//! next rebuild converges the index again.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::gate::ValidationGate;
use crate::index::{ListingIndex, ListingIndexStore};
use crate::ledger::{DedupLedger, Ledger, LedgerRecord, PublishStatus};
use crate::models::{Document, IndexEntry};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Scan and report only; write nothing.
    pub dry_run: bool,
    /// Also regenerate the dedup ledger from the scanned documents.
    pub with_ledger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// File could not be read or parsed.
    Invalid,
    /// Parsed, but fails validation or does not match its file name.
    Quarantined,
    /// Two documents claim the same topic key.
    TopicConflict,
}

impl IssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::Invalid => "invalid",
            IssueKind::Quarantined => "quarantined",
            IssueKind::TopicConflict => "topic-conflict",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RebuildIssue {
    pub slug: String,
    pub kind: IssueKind,
    pub reason: String,
}

/// What a rebuild saw and did. Counters follow the scan classification;
/// `errors` carries one entry per affected document, never a summary.
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    pub scanned: usize,
    pub valid: usize,
    pub invalid: usize,
    pub quarantined: usize,
    pub excluded: usize,
    pub errors: Vec<RebuildIssue>,
    pub dry_run: bool,
    pub ledger_rebuilt: bool,
}

/// Everything a corpus scan produces: index entries for listed documents,
/// ledger records for every publishable topic, and the classification
/// report.
pub struct CorpusScan {
    pub entries: Vec<IndexEntry>,
    pub ledger: BTreeMap<String, LedgerRecord>,
    pub report: RebuildReport,
}

/// Scan the whole store and classify every file. Pure with respect to the
/// index and ledger: nothing is written. Also used by the listing index
/// to self-heal a corrupt file on load.
pub fn scan_corpus(
    store: &DocumentStore,
    gate: &ValidationGate,
    max_tags: usize,
    max_keywords: usize,
) -> Result<CorpusScan, StoreError> {
    let mut report = RebuildReport::default();
    let mut entries = Vec::new();
    // topic_key -> document currently holding the topic (newest wins)
    let mut topics: BTreeMap<String, Document> = BTreeMap::new();

    for item in store.scan_all()? {
        report.scanned += 1;
        let (slug, bytes) = match item {
            Ok(pair) => pair,
            Err(err) => {
                let slug = match &err {
                    StoreError::Io { path, .. } => path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("?")
                        .to_string(),
                    _ => "?".to_string(),
                };
                warn!(slug = %slug, "skipping unreadable document: {err}");
                report.invalid += 1;
                report.errors.push(RebuildIssue {
                    slug,
                    kind: IssueKind::Invalid,
                    reason: format!("read failed: {}", err),
                });
                continue;
            }
        };

        let doc: Document = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(slug = %slug, "skipping unparseable document: {e}");
                report.invalid += 1;
                report.errors.push(RebuildIssue {
                    slug,
                    kind: IssueKind::Invalid,
                    reason: format!("parse failed: {}", e),
                });
                continue;
            }
        };

        if doc.slug != slug {
            warn!(
                file = %slug,
                claimed = %doc.slug,
                "quarantining document whose slug disagrees with its file name"
            );
            report.quarantined += 1;
            report.errors.push(RebuildIssue {
                slug,
                kind: IssueKind::Quarantined,
                reason: format!("document claims slug '{}', file name disagrees", doc.slug),
            });
            continue;
        }

        // The topic was published once even if the document is now a
        // draft or fails today's stricter rules; the ledger must keep
        // blocking it. Newest update wins a conflict.
        match topics.get(&doc.topic_key) {
            Some(holder) if holder.updated_at >= doc.updated_at => {
                report.errors.push(RebuildIssue {
                    slug: doc.slug.clone(),
                    kind: IssueKind::TopicConflict,
                    reason: format!(
                        "topic '{}' is also held by '{}'; ledger keeps the newer",
                        doc.topic_key, holder.slug
                    ),
                });
            }
            Some(holder) => {
                report.errors.push(RebuildIssue {
                    slug: holder.slug.clone(),
                    kind: IssueKind::TopicConflict,
                    reason: format!(
                        "topic '{}' is also held by '{}'; ledger keeps the newer",
                        doc.topic_key, doc.slug
                    ),
                });
                topics.insert(doc.topic_key.clone(), doc.clone());
            }
            None => {
                topics.insert(doc.topic_key.clone(), doc.clone());
            }
        }

        let gate_report = gate.validate(&doc.as_candidate());
        if !gate_report.passed {
            report.quarantined += 1;
            let reasons: Vec<String> = gate_report
                .blocking
                .iter()
                .map(|v| format!("{}: {}", v.rule, v.message))
                .collect();
            let reason = reasons.join("; ");
            warn!(slug = %doc.slug, "quarantining document that fails validation: {reason}");
            report.errors.push(RebuildIssue {
                slug: doc.slug.clone(),
                kind: IssueKind::Quarantined,
                reason,
            });
            continue;
        }

        if !doc.is_listed() {
            report.excluded += 1;
            continue;
        }

        report.valid += 1;
        entries.push(IndexEntry::project(&doc, max_tags, max_keywords));
    }

    let ledger = topics
        .into_iter()
        .map(|(topic_key, doc)| {
            (
                topic_key,
                LedgerRecord {
                    status: PublishStatus::Published,
                    content_hash: Some(doc.content_hash),
                    slug: Some(doc.slug),
                    reservation: None,
                    reserved_at: None,
                    // Derived from the document, not the wall clock, so
                    // repeated rebuilds are byte-identical.
                    last_published_at: Some(doc.updated_at),
                },
            )
        })
        .collect();

    Ok(CorpusScan {
        entries,
        ledger,
        report,
    })
}

/// Rebuild the listing index (and optionally the ledger) from the store.
pub async fn rebuild(config: &Config, options: RebuildOptions) -> Result<RebuildReport> {
    let store = DocumentStore::from_config(config);
    let gate = ValidationGate::from_config(config);

    let mut scan = scan_corpus(&store, &gate, config.index.max_tags, config.index.max_keywords)
        .context("failed to scan document store")?;
    scan.report.dry_run = options.dry_run;

    if options.dry_run {
        return Ok(scan.report);
    }

    let index_store = ListingIndexStore::from_config(config);
    let index = ListingIndex::from_entries(scan.entries);
    index_store
        .replace(&index)
        .await
        .context("failed to write rebuilt index")?;
    info!(entries = index.len(), "listing index rebuilt");

    if options.with_ledger {
        let ledger_store = DedupLedger::from_config(config);
        ledger_store
            .replace(&Ledger::from_records(scan.ledger))
            .await
            .context("failed to write rebuilt ledger")?;
        scan.report.ledger_rebuilt = true;
        info!("dedup ledger rebuilt");
    }

    Ok(scan.report)
}

/// Run the `rebuild` command and print the report.
pub async fn run_rebuild(config: &Config, dry_run: bool, with_ledger: bool) -> Result<()> {
    let report = rebuild(
        config,
        RebuildOptions {
            dry_run,
            with_ledger,
        },
    )
    .await?;

    if report.dry_run {
        println!("Rebuild (dry run; nothing written)");
    } else if report.ledger_rebuilt {
        println!("Rebuild complete (index + ledger)");
    } else {
        println!("Rebuild complete (index)");
    }
    println!("  scanned:     {}", report.scanned);
    println!("  valid:       {}", report.valid);
    println!("  invalid:     {}", report.invalid);
    println!("  quarantined: {}", report.quarantined);
    println!("  excluded:    {}", report.excluded);

    if !report.errors.is_empty() {
        println!();
        println!("Issues:");
        for issue in &report.errors {
            println!("  [{}] {}: {}", issue.kind.label(), issue.slug, issue.reason);
        }
    }
    Ok(())
}
