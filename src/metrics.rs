//! Bounded publish metrics.
//!
//! Aggregate counters grow monotonically; everything else is capped: a
//! ring buffer of recent outcomes and a top-K map of failure counts by
//! topic, so the metrics file stays within a small constant size no
//! matter how many operations run. Recording is fire-and-forget: a
//! metrics write must never fail a publish, so errors here are logged
//! and swallowed. Updates are last-writer-wins; the index and ledger are
//! the only serialized resources in the system, and metrics are advisory.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::error::PublishErrorCode;

pub const METRICS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Published,
    /// The candidate was turned away (validation, dedup, collision).
    Rejected,
    /// The system could not complete the publish (I/O, lock, corruption).
    Failed,
    NotifyFailed,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Published => "published",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::Failed => "failed",
            OutcomeKind::NotifyFailed => "notify-failed",
        }
    }
}

/// One recorded outcome, as kept in the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub at: DateTime<Utc>,
    pub kind: OutcomeKind,
    pub slug: String,
    pub topic_key: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl OutcomeEvent {
    pub fn published(slug: &str, topic_key: &str) -> OutcomeEvent {
        OutcomeEvent {
            at: Utc::now(),
            kind: OutcomeKind::Published,
            slug: slug.to_string(),
            topic_key: topic_key.to_string(),
            code: None,
            detail: None,
        }
    }

    pub fn failure(
        slug: &str,
        topic_key: &str,
        code: PublishErrorCode,
        detail: &str,
    ) -> OutcomeEvent {
        let kind = match code {
            PublishErrorCode::ValidationFailed
            | PublishErrorCode::DuplicateTopic
            | PublishErrorCode::InFlightTopic
            | PublishErrorCode::SlugCollision
            | PublishErrorCode::SlugTaken => OutcomeKind::Rejected,
            _ => OutcomeKind::Failed,
        };
        OutcomeEvent {
            at: Utc::now(),
            kind,
            slug: slug.to_string(),
            topic_key: topic_key.to_string(),
            code: Some(code.as_str().to_string()),
            detail: Some(detail.to_string()),
        }
    }

    pub fn notify_failed(slug: &str, topic_key: &str, detail: &str) -> OutcomeEvent {
        OutcomeEvent {
            at: Utc::now(),
            kind: OutcomeKind::NotifyFailed,
            slug: slug.to_string(),
            topic_key: topic_key.to_string(),
            code: None,
            detail: Some(detail.to_string()),
        }
    }
}

/// The metrics file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub schema_version: u32,
    pub attempts: u64,
    pub published: u64,
    pub notify_failures: u64,
    pub failures_by_code: BTreeMap<String, u64>,
    pub recent: VecDeque<OutcomeEvent>,
    pub top_failures: BTreeMap<String, u64>,
}

impl MetricsRecord {
    pub fn empty() -> MetricsRecord {
        MetricsRecord {
            schema_version: METRICS_SCHEMA_VERSION,
            attempts: 0,
            published: 0,
            notify_failures: 0,
            failures_by_code: BTreeMap::new(),
            recent: VecDeque::new(),
            top_failures: BTreeMap::new(),
        }
    }

    /// Fold one event in, enforcing the capacity bounds.
    pub fn apply(&mut self, event: OutcomeEvent, recent_cap: usize, top_cap: usize) {
        match event.kind {
            OutcomeKind::Published => {
                self.attempts += 1;
                self.published += 1;
            }
            OutcomeKind::Rejected | OutcomeKind::Failed => {
                self.attempts += 1;
                let code = event.code.clone().unwrap_or_else(|| "unknown".to_string());
                *self.failures_by_code.entry(code).or_insert(0) += 1;
                *self
                    .top_failures
                    .entry(event.topic_key.clone())
                    .or_insert(0) += 1;
                if self.top_failures.len() > top_cap {
                    truncate_top(&mut self.top_failures, top_cap);
                }
            }
            OutcomeKind::NotifyFailed => {
                self.notify_failures += 1;
            }
        }
        self.recent.push_back(event);
        while self.recent.len() > recent_cap {
            self.recent.pop_front();
        }
    }
}

/// Keep only the `cap` highest counts. Ties break on key so the result is
/// deterministic.
fn truncate_top(map: &mut BTreeMap<String, u64>, cap: usize) {
    let mut ranked: Vec<(String, u64)> = std::mem::take(map).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(cap);
    *map = ranked.into_iter().collect();
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    path: PathBuf,
    recent_capacity: usize,
    top_failures_capacity: usize,
}

impl MetricsRecorder {
    pub fn from_config(config: &Config) -> MetricsRecorder {
        MetricsRecorder {
            path: config.metrics_path(),
            recent_capacity: config.metrics.recent_capacity,
            top_failures_capacity: config.metrics.top_failures_capacity,
        }
    }

    /// Record one outcome. Infallible by contract: any load or write
    /// problem is logged and swallowed, and a corrupt metrics file is
    /// simply started over.
    pub fn record(&self, event: OutcomeEvent) {
        let mut record = self.snapshot();
        record.apply(event, self.recent_capacity, self.top_failures_capacity);
        match serde_json::to_vec_pretty(&record) {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                if let Err(err) = write_atomic(&self.path, &bytes) {
                    warn!("failed to write metrics: {err}");
                }
            }
            Err(err) => warn!("failed to serialize metrics: {err}"),
        }
    }

    /// Current metrics, or an empty record when the file is missing or
    /// unreadable (it heals on the next write).
    pub fn snapshot(&self) -> MetricsRecord {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return MetricsRecord::empty(),
            Err(err) => {
                warn!("failed to read metrics file: {err}");
                return MetricsRecord::empty();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(err) => {
                warn!("metrics file corrupt, starting over: {err}");
                MetricsRecord::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recorder(dir: &TempDir, recent: usize, top: usize) -> MetricsRecorder {
        MetricsRecorder {
            path: dir.path().join("metrics.json"),
            recent_capacity: recent,
            top_failures_capacity: top,
        }
    }

    #[test]
    fn counters_accumulate() {
        let dir = TempDir::new().unwrap();
        let recorder = recorder(&dir, 50, 20);

        recorder.record(OutcomeEvent::published("a", "t::a"));
        recorder.record(OutcomeEvent::published("b", "t::b"));
        recorder.record(OutcomeEvent::failure(
            "c",
            "t::c",
            PublishErrorCode::ValidationFailed,
            "too short",
        ));
        recorder.record(OutcomeEvent::notify_failed("a", "t::a", "timeout"));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.published, 2);
        assert_eq!(snapshot.notify_failures, 1);
        assert_eq!(snapshot.failures_by_code["validation_failed"], 1);
        assert_eq!(snapshot.top_failures["t::c"], 1);
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut record = MetricsRecord::empty();
        for i in 0..20 {
            record.apply(
                OutcomeEvent::published(&format!("slug-{}", i), "t"),
                5,
                20,
            );
        }
        assert_eq!(record.recent.len(), 5);
        assert_eq!(record.recent.front().unwrap().slug, "slug-15");
        assert_eq!(record.recent.back().unwrap().slug, "slug-19");
    }

    #[test]
    fn top_failures_keeps_highest_counts() {
        let mut record = MetricsRecord::empty();
        let mut fail = |topic: &str, times: usize| {
            for _ in 0..times {
                record.apply(
                    OutcomeEvent::failure("s", topic, PublishErrorCode::StoreFailed, "io"),
                    50,
                    3,
                );
            }
        };
        fail("t::heavy", 5);
        fail("t::medium", 4);
        fail("t::light", 3);
        fail("t::once", 1);

        assert_eq!(record.top_failures.len(), 3);
        assert!(record.top_failures.contains_key("t::heavy"));
        assert!(record.top_failures.contains_key("t::medium"));
        assert!(record.top_failures.contains_key("t::light"));
        assert!(!record.top_failures.contains_key("t::once"));
    }

    #[test]
    fn structures_stay_bounded_over_many_events() {
        let mut record = MetricsRecord::empty();
        for i in 0..10_000 {
            record.apply(
                OutcomeEvent::failure(
                    "s",
                    &format!("t::{}", i % 100),
                    PublishErrorCode::LockTimeout,
                    "contention",
                ),
                50,
                20,
            );
        }
        assert_eq!(record.attempts, 10_000);
        assert_eq!(record.recent.len(), 50);
        assert!(record.top_failures.len() <= 20);
    }

    #[test]
    fn metrics_file_stays_small() {
        let dir = TempDir::new().unwrap();
        let recorder = recorder(&dir, 50, 20);
        for i in 0..300 {
            recorder.record(OutcomeEvent::failure(
                &format!("slug-{}", i),
                &format!("topic::{}", i % 40),
                PublishErrorCode::ValidationFailed,
                "body has 3 words, minimum is 120",
            ));
        }
        let size = std::fs::metadata(dir.path().join("metrics.json"))
            .unwrap()
            .len();
        assert!(size <= 64 * 1024, "metrics file is {} bytes", size);
    }

    #[test]
    fn corrupt_file_starts_over_instead_of_failing() {
        let dir = TempDir::new().unwrap();
        let recorder = recorder(&dir, 50, 20);
        std::fs::write(dir.path().join("metrics.json"), b"][").unwrap();

        recorder.record(OutcomeEvent::published("a", "t::a"));
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.attempts, 1);
    }

    #[test]
    fn record_swallows_write_failures() {
        let dir = TempDir::new().unwrap();
        let recorder = recorder(&dir, 50, 20);
        // A directory at the metrics path makes the rename fail.
        std::fs::create_dir(dir.path().join("metrics.json")).unwrap();
        recorder.record(OutcomeEvent::published("a", "t::a"));
    }
}
