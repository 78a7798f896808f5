//! Typed errors for the publishing core.
//!
//! Every persistence component returns a typed result so callers can make
//! a local retry/abort decision. Nothing in the core panics on I/O; the
//! only errors that are deliberately swallowed are metrics writes and
//! post-commit cache invalidation (see [`MetricsRecorder`](crate::metrics::MetricsRecorder)
//! and [`publish`](crate::publish)).

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::gate::GateReport;

/// Errors from the atomic write primitive.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The bytes read back from the temp file did not match what was
    /// written. The temp file has been removed; the target is untouched.
    #[error("write verification failed for {path}")]
    VerificationFailed { path: PathBuf },

    #[error("i/o error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the index lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// `max_wait` elapsed without the lock becoming free.
    #[error("timed out after {waited_ms} ms waiting for lock {path}")]
    Timeout { path: PathBuf, waited_ms: u64 },

    #[error("i/o error on lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("slug '{slug}' is not a valid document key (expected [a-z0-9-], 1..=100 chars)")]
    InvalidSlug { slug: String },

    /// A file for this slug already exists and overwrite was not requested.
    #[error("document already exists for slug '{slug}'")]
    AlreadyExists { slug: String },

    /// Overwrite was requested, but the stored document belongs to a
    /// different logical topic. Never resolved silently.
    #[error("slug '{slug}' is already used by an unrelated document (topic '{existing_topic}')")]
    SlugCollision {
        slug: String,
        existing_topic: String,
    },

    /// The stored file for this slug could not be parsed.
    #[error("stored document for slug '{slug}' is corrupt: {reason}")]
    Corrupt { slug: String, reason: String },

    #[error("failed to serialize document '{slug}': {source}")]
    Serialize {
        slug: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("i/o error in document store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from listing-index mutation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A second entry with the same slug but a different document id.
    #[error("slug '{slug}' is already indexed under a different document id")]
    DuplicateSlug { slug: String },

    /// The index file failed to parse and recovery also failed.
    #[error("listing index is corrupt: {reason}")]
    Corrupt { reason: String },

    #[error("failed to serialize listing index: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("i/o error on listing index at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the dedup ledger.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The topic is already published. Carries both hashes so callers can
    /// tell an identical resubmission from drifted content.
    #[error("topic '{topic_key}' is already published")]
    AlreadyPublished {
        topic_key: String,
        existing_hash: Option<String>,
        submitted_hash: String,
    },

    /// Another reservation for the same topic is currently pending.
    #[error("topic '{topic_key}' has a publish in flight (reserved at {reserved_at})")]
    InFlight {
        topic_key: String,
        reserved_at: String,
    },

    /// A commit/abort arrived with a token that no longer matches the
    /// pending record (e.g. the reservation was reclaimed as stale).
    #[error("reservation token for topic '{topic_key}' no longer matches the ledger")]
    TokenMismatch { topic_key: String },

    #[error("dedup ledger is corrupt: {reason}; run `press rebuild --with-ledger`")]
    Corrupt { reason: String },

    #[error("failed to serialize dedup ledger: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("i/o error on dedup ledger at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stable machine-readable publish failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishErrorCode {
    ValidationFailed,
    DuplicateTopic,
    InFlightTopic,
    SlugCollision,
    /// The slug already has a document for the same topic and overwrite
    /// was not requested. Unlike a collision, this is resolved by
    /// `--overwrite`, not by caller intervention.
    SlugTaken,
    WriteVerificationFailed,
    LockTimeout,
    IndexCorrupt,
    StoreFailed,
    IndexFailed,
    /// The document is durably stored and indexed, but the ledger could
    /// not be marked published. Repair with `press rebuild --with-ledger`.
    LedgerCommitFailed,
    Internal,
}

impl PublishErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishErrorCode::ValidationFailed => "validation_failed",
            PublishErrorCode::DuplicateTopic => "duplicate_topic",
            PublishErrorCode::InFlightTopic => "in_flight_topic",
            PublishErrorCode::SlugCollision => "slug_collision",
            PublishErrorCode::SlugTaken => "slug_taken",
            PublishErrorCode::WriteVerificationFailed => "write_verification_failed",
            PublishErrorCode::LockTimeout => "lock_timeout",
            PublishErrorCode::IndexCorrupt => "index_corrupt",
            PublishErrorCode::StoreFailed => "store_failed",
            PublishErrorCode::IndexFailed => "index_failed",
            PublishErrorCode::LedgerCommitFailed => "ledger_commit_failed",
            PublishErrorCode::Internal => "internal",
        }
    }
}

/// Failure of the composed publish operation.
///
/// Carries the complete list of violated rules or failure details, not
/// just the first, so a caller can fix a candidate in one pass.
#[derive(Debug, Error)]
#[error("publish failed [{}]: {}", self.code.as_str(), self.messages.join("; "))]
pub struct PublishError {
    pub code: PublishErrorCode,
    pub messages: Vec<String>,
}

impl PublishError {
    pub fn new(code: PublishErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            messages: vec![message.into()],
        }
    }

    /// Build a validation failure from a gate report, carrying every
    /// blocking violation.
    pub fn validation(report: &GateReport) -> Self {
        Self {
            code: PublishErrorCode::ValidationFailed,
            messages: report
                .blocking
                .iter()
                .map(|v| format!("{}: {}", v.rule, v.message))
                .collect(),
        }
    }
}

impl From<DedupError> for PublishError {
    fn from(err: DedupError) -> Self {
        let code = match &err {
            DedupError::AlreadyPublished { .. } => PublishErrorCode::DuplicateTopic,
            DedupError::InFlight { .. } => PublishErrorCode::InFlightTopic,
            DedupError::Lock(LockError::Timeout { .. }) => PublishErrorCode::LockTimeout,
            DedupError::Write(WriteError::VerificationFailed { .. }) => {
                PublishErrorCode::WriteVerificationFailed
            }
            _ => PublishErrorCode::Internal,
        };
        let mut messages = vec![err.to_string()];
        if let DedupError::AlreadyPublished {
            existing_hash,
            submitted_hash,
            ..
        } = &err
        {
            match existing_hash {
                Some(existing) if existing == submitted_hash => {
                    messages.push("submitted content is identical to the published version".into())
                }
                Some(_) => messages
                    .push("submitted content differs from the published version (near-duplicate); pass --force to replace".into()),
                None => {}
            }
        }
        Self { code, messages }
    }
}

impl From<StoreError> for PublishError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::SlugCollision { .. } => PublishErrorCode::SlugCollision,
            StoreError::AlreadyExists { .. } => PublishErrorCode::SlugTaken,
            StoreError::Write(WriteError::VerificationFailed { .. }) => {
                PublishErrorCode::WriteVerificationFailed
            }
            _ => PublishErrorCode::StoreFailed,
        };
        let mut messages = vec![err.to_string()];
        if matches!(err, StoreError::AlreadyExists { .. }) {
            messages.push("pass --overwrite to replace the existing document".into());
        }
        Self { code, messages }
    }
}

impl From<IndexError> for PublishError {
    fn from(err: IndexError) -> Self {
        let code = match &err {
            IndexError::DuplicateSlug { .. } => PublishErrorCode::SlugCollision,
            IndexError::Corrupt { .. } => PublishErrorCode::IndexCorrupt,
            IndexError::Lock(LockError::Timeout { .. }) => PublishErrorCode::LockTimeout,
            IndexError::Write(WriteError::VerificationFailed { .. }) => {
                PublishErrorCode::WriteVerificationFailed
            }
            _ => PublishErrorCode::IndexFailed,
        };
        Self {
            code,
            messages: vec![err.to_string()],
        }
    }
}
