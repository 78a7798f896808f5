//! Dedup ledger: one record per logical topic, tracking whether the topic
//! is published, in flight, or failed.
//!
//! Publishing reserves a topic first and resolves the reservation later,
//! so two concurrent generations of the same idea can never both land.
//! The protocol is a small state machine per topic: `pending` moves to
//! exactly one of `published` or `failed`, enforced in the type system by
//! [`ReservationToken`] being consumed by value in [`DedupLedger::commit`]
//! and [`DedupLedger::abort`]. A reservation left `pending` by a crashed
//! process is reclaimed after a configurable age.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::error::DedupError;
use crate::lock::IndexLock;

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Pending,
    Published,
    Failed,
}

/// Per-topic ledger record.
///
/// `content_hash`, `slug`, and `last_published_at` always describe the
/// last *published* state and survive later reservations and failures;
/// `reservation` and `reserved_at` describe the current in-flight attempt
/// and are cleared when it resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub status: PublishStatus,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub reservation: Option<String>,
    #[serde(default)]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,
}

/// The ledger file: topic key to record, sorted by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub schema_version: u32,
    pub records: BTreeMap<String, LedgerRecord>,
}

impl Ledger {
    pub fn empty() -> Ledger {
        Ledger {
            schema_version: LEDGER_SCHEMA_VERSION,
            records: BTreeMap::new(),
        }
    }

    pub fn from_records(records: BTreeMap<String, LedgerRecord>) -> Ledger {
        Ledger {
            schema_version: LEDGER_SCHEMA_VERSION,
            records,
        }
    }

    /// Canonical serialization; rebuild idempotence relies on every writer
    /// going through this.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DedupError> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|source| DedupError::Serialize { source })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn parse(bytes: &[u8]) -> Result<Ledger, DedupError> {
        let ledger: Ledger = serde_json::from_slice(bytes).map_err(|e| DedupError::Corrupt {
            reason: e.to_string(),
        })?;
        if ledger.schema_version != LEDGER_SCHEMA_VERSION {
            return Err(DedupError::Corrupt {
                reason: format!("unsupported schema_version {}", ledger.schema_version),
            });
        }
        Ok(ledger)
    }
}

/// Proof of a successful reservation.
///
/// Deliberately neither `Clone` nor `Copy`: the only ways to dispose of a
/// token are `commit` and `abort`, which take it by value, so each
/// reservation resolves at most once.
#[derive(Debug)]
pub struct ReservationToken {
    topic_key: String,
    token: String,
    content_hash: String,
    slug: String,
}

impl ReservationToken {
    pub fn topic_key(&self) -> &str {
        &self.topic_key
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }
}

#[derive(Clone)]
pub struct DedupLedger {
    path: PathBuf,
    lock: IndexLock,
    pending_stale_after: Duration,
}

impl DedupLedger {
    pub fn new(path: PathBuf, lock: IndexLock, pending_stale_after: Duration) -> DedupLedger {
        DedupLedger {
            path,
            lock,
            pending_stale_after,
        }
    }

    pub fn from_config(config: &Config) -> DedupLedger {
        DedupLedger::new(
            config.ledger_path(),
            IndexLock::from_config(config),
            config.pending_stale_after(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve `topic_key` for publication.
    ///
    /// Fails with `AlreadyPublished` when the topic is published and
    /// `force` is not set (the error carries both hashes, so the caller
    /// can tell an identical resubmission from drifted content), and with
    /// `InFlight` when a fresh `pending` reservation exists. A `pending`
    /// record older than the stale threshold belongs to a crashed
    /// publisher and is reclaimed.
    pub async fn check_and_reserve(
        &self,
        topic_key: &str,
        content_hash: &str,
        slug: &str,
        force: bool,
    ) -> Result<ReservationToken, DedupError> {
        let topic_key = topic_key.to_string();
        let content_hash = content_hash.to_string();
        let slug = slug.to_string();
        self.lock
            .with_lock(move || async move {
                let mut ledger = self.load_unlocked()?;

                if let Some(record) = ledger.records.get(&topic_key) {
                    match record.status {
                        PublishStatus::Published if !force => {
                            return Err(DedupError::AlreadyPublished {
                                topic_key,
                                existing_hash: record.content_hash.clone(),
                                submitted_hash: content_hash,
                            });
                        }
                        PublishStatus::Pending => {
                            if self.pending_is_fresh(record) {
                                return Err(DedupError::InFlight {
                                    topic_key,
                                    reserved_at: record
                                        .reserved_at
                                        .map(|t| t.to_rfc3339())
                                        .unwrap_or_else(|| "unknown".to_string()),
                                });
                            }
                            warn!(
                                topic_key = %topic_key,
                                "reclaiming stale pending reservation"
                            );
                        }
                        _ => {}
                    }
                }

                let token = Uuid::new_v4().to_string();
                let prior = ledger.records.get(&topic_key).cloned();
                ledger.records.insert(
                    topic_key.clone(),
                    LedgerRecord {
                        status: PublishStatus::Pending,
                        content_hash: prior.as_ref().and_then(|p| p.content_hash.clone()),
                        slug: prior.as_ref().and_then(|p| p.slug.clone()),
                        reservation: Some(token.clone()),
                        reserved_at: Some(Utc::now()),
                        last_published_at: prior.and_then(|p| p.last_published_at),
                    },
                );
                self.write_unlocked(&ledger)?;

                Ok(ReservationToken {
                    topic_key,
                    token,
                    content_hash,
                    slug,
                })
            })
            .await
    }

    /// Resolve a reservation as published: record the new content hash,
    /// slug, and publish time, and clear the in-flight state.
    pub async fn commit(&self, token: ReservationToken) -> Result<(), DedupError> {
        self.resolve(token, PublishStatus::Published).await
    }

    /// Resolve a reservation as failed, clearing the in-flight state. The
    /// last published hash and slug are kept; `failed` does not block a
    /// retry.
    pub async fn abort(&self, token: ReservationToken) -> Result<(), DedupError> {
        self.resolve(token, PublishStatus::Failed).await
    }

    async fn resolve(
        &self,
        token: ReservationToken,
        outcome: PublishStatus,
    ) -> Result<(), DedupError> {
        self.lock
            .with_lock(move || async move {
                let mut ledger = self.load_unlocked()?;
                let record = match ledger.records.get_mut(&token.topic_key) {
                    Some(record)
                        if record.status == PublishStatus::Pending
                            && record.reservation.as_deref() == Some(&token.token) =>
                    {
                        record
                    }
                    // Reclaimed as stale, or the ledger moved underneath
                    // us. The reservation is no longer ours to resolve.
                    _ => {
                        return Err(DedupError::TokenMismatch {
                            topic_key: token.topic_key,
                        })
                    }
                };

                record.status = outcome;
                record.reservation = None;
                record.reserved_at = None;
                if outcome == PublishStatus::Published {
                    record.content_hash = Some(token.content_hash);
                    record.slug = Some(token.slug);
                    record.last_published_at = Some(Utc::now());
                }
                self.write_unlocked(&ledger)
            })
            .await
    }

    /// Unlocked advisory read of one record, for dry runs and status
    /// output. Never used to make a publish decision.
    pub fn peek(&self, topic_key: &str) -> Result<Option<LedgerRecord>, DedupError> {
        Ok(self
            .read_raw()?
            .and_then(|ledger| ledger.records.get(topic_key).cloned()))
    }

    /// Strict read: `None` when absent, `Corrupt` when unparseable.
    pub fn read_raw(&self) -> Result<Option<Ledger>, DedupError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DedupError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ledger::parse(&bytes).map(Some)
    }

    /// Replace the whole ledger under the lock. Used by the rebuilder.
    pub async fn replace(&self, ledger: &Ledger) -> Result<(), DedupError> {
        self.lock
            .with_lock(move || async move { self.write_unlocked(ledger) })
            .await
    }

    fn load_unlocked(&self) -> Result<Ledger, DedupError> {
        Ok(self.read_raw()?.unwrap_or_else(Ledger::empty))
    }

    fn write_unlocked(&self, ledger: &Ledger) -> Result<(), DedupError> {
        let bytes = ledger.to_bytes()?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }

    fn pending_is_fresh(&self, record: &LedgerRecord) -> bool {
        match record.reserved_at {
            Some(reserved_at) => {
                let age = Utc::now().signed_duration_since(reserved_at);
                age.to_std().unwrap_or(Duration::ZERO) < self.pending_stale_after
            }
            // Pending with no timestamp is malformed; treat as stale.
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_with_stale(dir: &TempDir, stale: Duration) -> DedupLedger {
        let lock = IndexLock::new(
            dir.path().join("index.lock"),
            Duration::from_millis(500),
            Duration::from_secs(60),
            Duration::from_millis(20),
        );
        DedupLedger::new(dir.path().join("ledger.json"), lock, stale)
    }

    fn ledger(dir: &TempDir) -> DedupLedger {
        ledger_with_stale(dir, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn reserve_commit_marks_published() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();

        let record = ledger.peek("guides::a").unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.content_hash.as_deref(), Some("hash-1"));
        assert_eq!(record.slug.as_deref(), Some("a"));
        assert!(record.reservation.is_none());
        assert!(record.last_published_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_reservation_is_in_flight() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let _token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        match ledger
            .check_and_reserve("guides::a", "hash-2", "b", false)
            .await
        {
            Err(DedupError::InFlight { topic_key, .. }) => assert_eq!(topic_key, "guides::a"),
            other => panic!("expected InFlight, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn published_topic_blocks_without_force() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();

        match ledger
            .check_and_reserve("guides::a", "hash-2", "a", false)
            .await
        {
            Err(DedupError::AlreadyPublished {
                existing_hash,
                submitted_hash,
                ..
            }) => {
                assert_eq!(existing_hash.as_deref(), Some("hash-1"));
                assert_eq!(submitted_hash, "hash-2");
            }
            other => panic!("expected AlreadyPublished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn force_republish_updates_hash() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();

        let token = ledger
            .check_and_reserve("guides::a", "hash-2", "a", true)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();

        let record = ledger.peek("guides::a").unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.content_hash.as_deref(), Some("hash-2"));
    }

    #[tokio::test]
    async fn abort_clears_in_flight_and_allows_retry() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.abort(token).await.unwrap();

        let record = ledger.peek("guides::a").unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
        assert!(record.reservation.is_none());

        // Failed does not block: the retry reserves cleanly.
        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();
    }

    #[tokio::test]
    async fn failed_force_republish_keeps_last_published_state() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);

        let token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        ledger.commit(token).await.unwrap();

        let token = ledger
            .check_and_reserve("guides::a", "hash-2", "a", true)
            .await
            .unwrap();
        ledger.abort(token).await.unwrap();

        let record = ledger.peek("guides::a").unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Failed);
        assert_eq!(record.content_hash.as_deref(), Some("hash-1"));
        assert_eq!(record.slug.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn stale_pending_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_with_stale(&dir, Duration::from_millis(20));

        let stale_token = ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh_token = ledger
            .check_and_reserve("guides::a", "hash-2", "a", false)
            .await
            .unwrap();

        // The reclaimed token can no longer resolve the reservation.
        match ledger.commit(stale_token).await {
            Err(DedupError::TokenMismatch { topic_key }) => assert_eq!(topic_key, "guides::a"),
            other => panic!("expected TokenMismatch, got {:?}", other),
        }
        ledger.commit(fresh_token).await.unwrap();

        let record = ledger.peek("guides::a").unwrap().unwrap();
        assert_eq!(record.content_hash.as_deref(), Some("hash-2"));
    }

    #[tokio::test]
    async fn corrupt_ledger_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger(&dir);
        std::fs::write(ledger.path(), b"{ not a ledger").unwrap();

        match ledger
            .check_and_reserve("guides::a", "hash-1", "a", false)
            .await
        {
            Err(DedupError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {:?}", other),
        }
    }
}
