//! The composed publish operation.
//!
//! `publish(candidate)` runs the full pipeline in a fixed order: validate,
//! reserve the topic, write the document, update the index, commit the
//! reservation, record metrics, notify the cache. The reservation token is
//! resolved on every exit path: committed after the document and index are
//! durable, aborted on any earlier failure. Everything after the ledger
//! commit is best-effort and can no longer fail the publish.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{PublishError, PublishErrorCode, StoreError};
use crate::gate::{GateReport, ValidationGate};
use crate::index::ListingIndexStore;
use crate::ledger::{DedupLedger, LedgerRecord};
use crate::metrics::{MetricsRecorder, OutcomeEvent};
use crate::models::{CandidateDocument, Document, PublishedRef};
use crate::notify::{create_invalidator, CacheInvalidator};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Republish a topic that is already published.
    pub force: bool,
    /// Replace an existing document file for the same slug.
    pub allow_overwrite: bool,
}

pub struct Publisher {
    store: DocumentStore,
    index: ListingIndexStore,
    ledger: DedupLedger,
    gate: ValidationGate,
    metrics: MetricsRecorder,
    invalidator: Box<dyn CacheInvalidator>,
}

impl Publisher {
    /// Build a publisher with an injected cache invalidator.
    pub fn new(config: &Config, invalidator: Box<dyn CacheInvalidator>) -> Publisher {
        Publisher {
            store: DocumentStore::from_config(config),
            index: ListingIndexStore::from_config(config),
            ledger: DedupLedger::from_config(config),
            gate: ValidationGate::from_config(config),
            metrics: MetricsRecorder::from_config(config),
            invalidator,
        }
    }

    pub fn from_config(config: &Config) -> Result<Publisher> {
        let invalidator = create_invalidator(config)?;
        Ok(Publisher::new(config, invalidator))
    }

    /// Publish one candidate document.
    ///
    /// On success the document file, index entry, and ledger record are
    /// all durable. On failure nothing new is visible: a freshly created
    /// document file is removed again if the index update fails, and the
    /// reservation is aborted. The one asymmetric case is a failed ledger
    /// commit after the document is already durable; that returns
    /// `LedgerCommitFailed` and is repaired by `rebuild --with-ledger`.
    pub async fn publish(
        &self,
        candidate: CandidateDocument,
        options: PublishOptions,
    ) -> Result<PublishedRef, PublishError> {
        let report = self.gate.validate(&candidate);
        for violation in &report.warnings {
            warn!(rule = %violation.rule, "validation warning: {}", violation.message);
        }
        if !report.passed {
            let err = PublishError::validation(&report);
            self.record_failure(&candidate.slug, &candidate.topic_key, &err);
            return Err(err);
        }

        let prior = match self.store.get(&candidate.slug) {
            Ok(prior) => prior,
            Err(store_err) => {
                let err = PublishError::from(store_err);
                self.record_failure(&candidate.slug, &candidate.topic_key, &err);
                return Err(err);
            }
        };
        let doc = Document::from_candidate(&candidate, prior.as_ref());

        // A slug held by an unrelated document is a hard conflict, caught
        // before anything is reserved. Same topic or identical content is
        // the republish case; the store gates that behind allow_overwrite.
        if let Some(prior_doc) = &prior {
            if prior_doc.content_hash != doc.content_hash && prior_doc.topic_key != doc.topic_key {
                let err = PublishError::new(
                    PublishErrorCode::SlugCollision,
                    format!(
                        "slug '{}' is already used by an unrelated document (topic '{}')",
                        doc.slug, prior_doc.topic_key
                    ),
                );
                self.record_failure(&doc.slug, &doc.topic_key, &err);
                return Err(err);
            }
        }

        let token = match self
            .ledger
            .check_and_reserve(&doc.topic_key, &doc.content_hash, &doc.slug, options.force)
            .await
        {
            Ok(token) => token,
            Err(dedup_err) => {
                let err = PublishError::from(dedup_err);
                self.record_failure(&doc.slug, &doc.topic_key, &err);
                return Err(err);
            }
        };

        match self.commit_document(&doc, options.allow_overwrite).await {
            Ok(()) => {
                if let Err(commit_err) = self.ledger.commit(token).await {
                    error!(
                        topic_key = %doc.topic_key,
                        "ledger commit failed after durable publish: {commit_err}"
                    );
                    let err = PublishError {
                        code: PublishErrorCode::LedgerCommitFailed,
                        messages: vec![
                            format!(
                                "document '{}' is stored and indexed, but the ledger commit failed: {}",
                                doc.slug, commit_err
                            ),
                            "run `press rebuild --with-ledger` to reconcile the ledger".to_string(),
                        ],
                    };
                    self.record_failure(&doc.slug, &doc.topic_key, &err);
                    return Err(err);
                }
            }
            Err(publish_err) => {
                if let Err(abort_err) = self.ledger.abort(token).await {
                    error!(
                        topic_key = %doc.topic_key,
                        "failed to abort reservation: {abort_err}"
                    );
                }
                self.record_failure(&doc.slug, &doc.topic_key, &publish_err);
                return Err(publish_err);
            }
        }

        info!(slug = %doc.slug, topic_key = %doc.topic_key, "published");
        self.metrics
            .record(OutcomeEvent::published(&doc.slug, &doc.topic_key));

        let paths = invalidation_paths(&doc);
        if let Err(notify_err) = self.invalidator.notify(&paths).await {
            warn!(slug = %doc.slug, "cache invalidation failed: {notify_err:#}");
            self.metrics.record(OutcomeEvent::notify_failed(
                &doc.slug,
                &doc.topic_key,
                &format!("{notify_err:#}"),
            ));
        }

        Ok(PublishedRef {
            id: doc.id,
            slug: doc.slug,
        })
    }

    /// Everything between reservation and commit: document file first,
    /// then the index entry. A listed document upserts its entry; an
    /// unlisted one removes any stale entry it may have had. If the index
    /// step fails, a file this call created is removed again so the store
    /// does not accrue unindexed orphans.
    async fn commit_document(
        &self,
        doc: &Document,
        allow_overwrite: bool,
    ) -> Result<(), PublishError> {
        let outcome = self.store.put(doc, allow_overwrite)?;

        let index_result = if doc.is_listed() {
            self.index.upsert_entry(self.index.project(doc)).await
        } else {
            self.index.remove_entry(&doc.slug).await.map(|_| ())
        };
        if let Err(index_err) = index_result {
            if outcome.created {
                if let Err(cleanup_err) = self.store.delete(&doc.slug) {
                    warn!(
                        slug = %doc.slug,
                        "failed to remove orphaned document file: {cleanup_err}"
                    );
                }
            }
            return Err(index_err.into());
        }
        Ok(())
    }

    /// What a publish would do, without reserving or writing anything.
    pub fn dry_run(&self, candidate: &CandidateDocument) -> Result<DryRunReport> {
        let gate = self.gate.validate(candidate);
        let ledger = self
            .ledger
            .peek(&candidate.topic_key)
            .context("failed to read ledger")?;
        let slug = match self.store.get(&candidate.slug) {
            Ok(Some(prior)) => SlugState::Taken {
                topic_key: prior.topic_key,
            },
            Ok(None) => SlugState::Available,
            // A real publish would refuse this slug; say so instead of
            // calling it available.
            Err(StoreError::Corrupt { reason, .. }) => SlugState::Unreadable { reason },
            Err(err) => {
                return Err(err).context("failed to read existing document");
            }
        };
        Ok(DryRunReport {
            content_hash: crate::models::content_hash(candidate),
            gate,
            ledger,
            slug,
        })
    }

    fn record_failure(&self, slug: &str, topic_key: &str, err: &PublishError) {
        let detail = err.messages.first().cloned().unwrap_or_default();
        self.metrics
            .record(OutcomeEvent::failure(slug, topic_key, err.code, &detail));
    }
}

/// Paths downstream caches must drop after a publish: the front page, the
/// category listing, and the document itself.
pub fn invalidation_paths(doc: &Document) -> Vec<String> {
    vec![
        "/".to_string(),
        format!("/{}/", doc.category),
        format!("/{}/{}", doc.category, doc.slug),
    ]
}

/// Facts a dry run gathered; the caller decides what they mean for its
/// flag combination.
#[derive(Debug)]
pub struct DryRunReport {
    pub gate: GateReport,
    pub ledger: Option<LedgerRecord>,
    pub slug: SlugState,
    pub content_hash: String,
}

/// What the candidate's slug currently points at in the store.
#[derive(Debug)]
pub enum SlugState {
    Available,
    Taken { topic_key: String },
    /// The stored file exists but does not parse.
    Unreadable { reason: String },
}

/// Run the `publish` command: read a candidate from a JSON file (or
/// stdin with `-`) and publish it.
pub async fn run_publish(
    config: &Config,
    file: &Path,
    force: bool,
    overwrite: bool,
    dry_run: bool,
) -> Result<()> {
    let raw = if file == Path::new("-") {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read candidate from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read candidate file: {}", file.display()))?
    };
    let candidate: CandidateDocument =
        serde_json::from_str(&raw).context("failed to parse candidate document")?;

    let publisher = Publisher::from_config(config)?;

    if dry_run {
        let report = publisher.dry_run(&candidate)?;
        print_dry_run(&candidate, &report, force, overwrite);
        return Ok(());
    }

    let options = PublishOptions {
        force,
        allow_overwrite: overwrite,
    };
    match publisher.publish(candidate, options).await {
        Ok(published) => {
            println!("Published '{}' ({})", published.slug, published.id);
            Ok(())
        }
        Err(err) => {
            eprintln!("Publish failed [{}]:", err.code.as_str());
            for message in &err.messages {
                eprintln!("  - {}", message);
            }
            std::process::exit(1);
        }
    }
}

fn print_dry_run(candidate: &CandidateDocument, report: &DryRunReport, force: bool, overwrite: bool) {
    println!(
        "Dry run for '{}' (topic '{}')",
        candidate.slug, candidate.topic_key
    );

    let mut blockers: Vec<String> = Vec::new();

    if report.gate.passed {
        println!("  validation:   passed ({} warnings)", report.gate.warnings.len());
    } else {
        println!(
            "  validation:   FAILED ({} violations)",
            report.gate.blocking.len()
        );
        blockers.push("validation failed".to_string());
    }
    for violation in &report.gate.blocking {
        println!("    [{}] {}", violation.rule, violation.message);
    }
    for violation in &report.gate.warnings {
        println!("    [warn {}] {}", violation.rule, violation.message);
    }

    match &report.ledger {
        Some(record) => {
            let status = format!("{:?}", record.status).to_lowercase();
            let same_hash = record.content_hash.as_deref() == Some(report.content_hash.as_str());
            println!(
                "  topic:        {}{}",
                status,
                if same_hash { " (identical content)" } else { "" }
            );
            match record.status {
                crate::ledger::PublishStatus::Published if !force => {
                    blockers.push("topic already published (needs --force)".to_string())
                }
                crate::ledger::PublishStatus::Pending => {
                    blockers.push("a publish for this topic is in flight".to_string())
                }
                _ => {}
            }
        }
        None => println!("  topic:        never published"),
    }

    match &report.slug {
        SlugState::Available => println!("  slug:         available"),
        SlugState::Taken { topic_key } => {
            println!("  slug:         taken (topic '{}')", topic_key);
            if topic_key != &candidate.topic_key {
                blockers.push(format!("slug belongs to unrelated topic '{}'", topic_key));
            } else if !overwrite {
                blockers.push("slug already has a document (needs --overwrite)".to_string());
            }
        }
        SlugState::Unreadable { reason } => {
            println!("  slug:         unreadable ({})", reason);
            blockers.push(
                "stored document for this slug is unreadable; delete it or run `press rebuild`"
                    .to_string(),
            );
        }
    }
    println!("  content hash: {}", report.content_hash);

    if blockers.is_empty() {
        println!("Would publish.");
    } else {
        println!("Would be rejected:");
        for blocker in &blockers {
            println!("  - {}", blocker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishErrorCode;
    use crate::ledger::PublishStatus;
    use crate::notify::DisabledInvalidator;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn candidate(slug: &str, topic: &str) -> CandidateDocument {
        CandidateDocument {
            slug: slug.to_string(),
            topic_key: topic.to_string(),
            title: format!("Title {}", slug),
            description: Some("summary".to_string()),
            category: "guides".to_string(),
            tags: vec!["tag".to_string()],
            keywords: vec!["kw".to_string()],
            body: format!("# {}\n\n{}", slug, "substantial words in the body ".repeat(30)),
            draft: false,
            exclude_from_index: false,
        }
    }

    fn publisher(config: &Config) -> Publisher {
        Publisher::new(config, Box::new(DisabledInvalidator))
    }

    #[tokio::test]
    async fn publish_lands_document_index_and_ledger() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        let published = publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();
        assert_eq!(published.slug, "alpha");

        let store = DocumentStore::from_config(&config);
        assert!(store.get("alpha").unwrap().is_some());

        let index = ListingIndexStore::from_config(&config).load().await.unwrap();
        assert!(index.find("alpha").is_some());

        let record = DedupLedger::from_config(&config)
            .peek("guides::alpha")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PublishStatus::Published);

        let snapshot = MetricsRecorder::from_config(&config).snapshot();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.published, 1);
    }

    #[tokio::test]
    async fn duplicate_topic_is_rejected_and_aborted_cleanly() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::same"), PublishOptions::default())
            .await
            .unwrap();

        let err = publisher
            .publish(candidate("bravo", "guides::same"), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::DuplicateTopic);

        // Nothing of the second attempt is visible.
        let store = DocumentStore::from_config(&config);
        assert!(store.get("bravo").unwrap().is_none());
        let index = ListingIndexStore::from_config(&config).load().await.unwrap();
        assert!(index.find("bravo").is_none());

        // The ledger still holds the first publish.
        let record = DedupLedger::from_config(&config)
            .peek("guides::same")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.slug.as_deref(), Some("alpha"));

        let snapshot = MetricsRecorder::from_config(&config).snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.failures_by_code["duplicate_topic"], 1);
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_ledger() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        let mut bad = candidate("alpha", "guides::alpha");
        bad.body = "# too\n\nshort".to_string();
        let err = publisher
            .publish(bad, PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::ValidationFailed);

        assert!(DedupLedger::from_config(&config)
            .peek("guides::alpha")
            .unwrap()
            .is_none());

        let snapshot = MetricsRecorder::from_config(&config).snapshot();
        assert_eq!(snapshot.failures_by_code["validation_failed"], 1);
    }

    #[tokio::test]
    async fn force_overwrite_republishes_a_topic() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        let first = publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        let mut regen = candidate("alpha", "guides::alpha");
        regen.title = "Title alpha, second edition".to_string();
        let second = publisher
            .publish(
                regen,
                PublishOptions {
                    force: true,
                    allow_overwrite: true,
                },
            )
            .await
            .unwrap();

        // Same logical document: the id is preserved across the rewrite.
        assert_eq!(second.id, first.id);

        let doc = DocumentStore::from_config(&config)
            .get("alpha")
            .unwrap()
            .unwrap();
        assert_eq!(doc.title, "Title alpha, second edition");

        let record = DedupLedger::from_config(&config)
            .peek("guides::alpha")
            .unwrap()
            .unwrap();
        assert_eq!(record.content_hash.as_deref(), Some(doc.content_hash.as_str()));

        let index = ListingIndexStore::from_config(&config).load().await.unwrap();
        assert_eq!(index.find("alpha").unwrap().title, "Title alpha, second edition");
    }

    #[tokio::test]
    async fn without_force_a_republish_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        let mut regen = candidate("alpha", "guides::alpha");
        regen.body.push_str("\nnew paragraph");
        let err = publisher
            .publish(
                regen,
                PublishOptions {
                    force: false,
                    allow_overwrite: true,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::DuplicateTopic);
        // Near-duplicate signal: content drifted.
        assert!(err.messages.iter().any(|m| m.contains("--force")));
    }

    #[tokio::test]
    async fn force_without_overwrite_is_slug_taken_not_collision() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        // Same topic, regenerated content, --force but no --overwrite:
        // the slug is merely taken by our own document, not colliding.
        let mut regen = candidate("alpha", "guides::alpha");
        regen.body.push_str("\nnew paragraph");
        let err = publisher
            .publish(
                regen,
                PublishOptions {
                    force: true,
                    allow_overwrite: false,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::SlugTaken);
        assert!(err.messages.iter().any(|m| m.contains("--overwrite")));

        // The reservation was aborted, so a corrected retry succeeds.
        publisher
            .publish(
                candidate("alpha", "guides::alpha"),
                PublishOptions {
                    force: true,
                    allow_overwrite: true,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn draft_is_stored_but_not_listed() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        let mut draft = candidate("alpha", "guides::alpha");
        draft.draft = true;
        publisher
            .publish(draft, PublishOptions::default())
            .await
            .unwrap();

        assert!(DocumentStore::from_config(&config)
            .get("alpha")
            .unwrap()
            .is_some());
        let index = ListingIndexStore::from_config(&config).load().await.unwrap();
        assert!(index.is_empty());
        let record = DedupLedger::from_config(&config)
            .peek("guides::alpha")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PublishStatus::Published);
    }

    #[tokio::test]
    async fn republishing_as_draft_delists_the_entry() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        let mut demoted = candidate("alpha", "guides::alpha");
        demoted.draft = true;
        publisher
            .publish(
                demoted,
                PublishOptions {
                    force: true,
                    allow_overwrite: true,
                },
            )
            .await
            .unwrap();

        let index = ListingIndexStore::from_config(&config).load().await.unwrap();
        assert!(index.find("alpha").is_none());
        assert!(DocumentStore::from_config(&config)
            .get("alpha")
            .unwrap()
            .unwrap()
            .draft);
    }

    #[tokio::test]
    async fn slug_collision_is_a_hard_conflict() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        // A different topic claiming the same slug, overwrite or not.
        let err = publisher
            .publish(candidate("alpha", "news::scoop"), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::SlugCollision);

        let err = publisher
            .publish(
                candidate("alpha", "news::scoop"),
                PublishOptions {
                    force: false,
                    allow_overwrite: true,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::SlugCollision);

        // The original document is untouched.
        let doc = DocumentStore::from_config(&config)
            .get("alpha")
            .unwrap()
            .unwrap();
        assert_eq!(doc.topic_key, "guides::alpha");
    }

    #[tokio::test]
    async fn failed_index_update_removes_the_fresh_file_and_aborts() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);
        let index_store = ListingIndexStore::from_config(&config);

        // Ghost entry: same slug, different document id, no backing file.
        let ghost = Document::from_candidate(&candidate("alpha", "guides::ghost"), None);
        index_store
            .upsert_entry(index_store.project(&ghost))
            .await
            .unwrap();

        let err = publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, PublishErrorCode::SlugCollision);

        // The document file created during the attempt was cleaned up.
        assert!(DocumentStore::from_config(&config)
            .get("alpha")
            .unwrap()
            .is_none());

        // The reservation resolved to failed, so a retry is possible.
        let record = DedupLedger::from_config(&config)
            .peek("guides::alpha")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
        assert!(record.reservation.is_none());
    }

    struct ExplodingInvalidator;

    #[async_trait]
    impl CacheInvalidator for ExplodingInvalidator {
        fn name(&self) -> &str {
            "exploding"
        }

        async fn notify(&self, _paths: &[String]) -> Result<()> {
            anyhow::bail!("cache is on fire")
        }
    }

    #[tokio::test]
    async fn notify_failure_never_fails_the_publish() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = Publisher::new(&config, Box::new(ExplodingInvalidator));

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        let snapshot = MetricsRecorder::from_config(&config).snapshot();
        assert_eq!(snapshot.published, 1);
        assert_eq!(snapshot.notify_failures, 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        publisher
            .publish(candidate("alpha", "guides::alpha"), PublishOptions::default())
            .await
            .unwrap();

        let report = publisher
            .dry_run(&candidate("bravo", "guides::alpha"))
            .unwrap();
        assert!(report.gate.passed);
        assert_eq!(
            report.ledger.as_ref().map(|r| r.status),
            Some(PublishStatus::Published)
        );
        assert!(matches!(report.slug, SlugState::Available));

        // Still exactly one document, one topic.
        assert_eq!(DocumentStore::from_config(&config).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn dry_run_reports_an_unreadable_slug_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_root(dir.path());
        let publisher = publisher(&config);

        let store = DocumentStore::from_config(&config);
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.document_path("alpha"), b"{ nope").unwrap();

        let report = publisher
            .dry_run(&candidate("alpha", "guides::alpha"))
            .unwrap();
        assert!(
            matches!(report.slug, SlugState::Unreadable { .. }),
            "a corrupt slug file must not be reported as available: {:?}",
            report.slug
        );
    }

    #[test]
    fn invalidation_paths_cover_front_category_and_document() {
        let doc = Document::from_candidate(&candidate("alpha", "guides::alpha"), None);
        assert_eq!(
            invalidation_paths(&doc),
            vec!["/", "/guides/", "/guides/alpha"]
        );
    }
}
