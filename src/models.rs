//! Core data models of the publishing core.
//!
//! These types represent the documents, index entries, and references that
//! flow through the publish and recovery pipelines. A [`CandidateDocument`]
//! is what a content generator hands us; a [`Document`] is the normalized
//! record that owns a file in the store; an [`IndexEntry`] is the bounded
//! projection of a document that lives in the listing index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Candidate produced by a content generator, before normalization.
///
/// Identity fields (`id`, `content_hash`, timestamps) are assigned by the
/// core at publish time, never by the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDocument {
    /// URL-safe unique key; immutable after first publish.
    pub slug: String,
    /// Identifies "the same idea" across regenerations, e.g. `guides::backups`.
    pub topic_key: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Opaque payload, potentially large. Never copied into the index.
    pub body: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub exclude_from_index: bool,
}

/// Normalized document as stored, one JSON file per slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable opaque identifier, assigned once and never reused.
    pub id: String,
    pub slug: String,
    pub topic_key: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub body: String,
    /// SHA-256 over the normalized body plus key fields; see [`content_hash`].
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub exclude_from_index: bool,
}

impl Document {
    /// Normalize a candidate into a storable document.
    ///
    /// When a prior version exists (overwrite of the same slug), its `id`
    /// and `created_at` are preserved; only `updated_at` moves.
    pub fn from_candidate(candidate: &CandidateDocument, prior: Option<&Document>) -> Document {
        let now = Utc::now();
        Document {
            id: prior
                .map(|p| p.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            slug: candidate.slug.clone(),
            topic_key: candidate.topic_key.clone(),
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            category: candidate.category.clone(),
            tags: candidate.tags.clone(),
            keywords: candidate.keywords.clone(),
            body: candidate.body.clone(),
            content_hash: content_hash(candidate),
            created_at: prior.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
            draft: candidate.draft,
            exclude_from_index: candidate.exclude_from_index,
        }
    }

    /// A document is listed unless it is a draft or explicitly excluded.
    pub fn is_listed(&self) -> bool {
        !self.draft && !self.exclude_from_index
    }

    /// View the stored document as a candidate again, for re-running the
    /// validation gate over an existing corpus.
    pub fn as_candidate(&self) -> CandidateDocument {
        CandidateDocument {
            slug: self.slug.clone(),
            topic_key: self.topic_key.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            keywords: self.keywords.clone(),
            body: self.body.clone(),
            draft: self.draft,
            exclude_from_index: self.exclude_from_index,
        }
    }
}

/// Bounded projection of a document for the listing index.
///
/// Never contains the body; its size is independent of body size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexEntry {
    /// Project a document into an index entry, truncating array-valued
    /// fields to the given caps so entry size is bounded at insertion time.
    pub fn project(doc: &Document, max_tags: usize, max_keywords: usize) -> IndexEntry {
        let mut tags = doc.tags.clone();
        tags.truncate(max_tags);
        let mut keywords = doc.keywords.clone();
        keywords.truncate(max_keywords);
        IndexEntry {
            id: doc.id.clone(),
            slug: doc.slug.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            category: doc.category.clone(),
            tags,
            keywords,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

/// Reference to a successfully published document.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedRef {
    pub id: String,
    pub slug: String,
}

/// Slugs are file-system identities, so the accepted alphabet is strict:
/// lowercase ASCII letters, digits, and hyphens, 1..=100 chars, with no
/// leading/trailing/double hyphen.
pub fn is_valid_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > 100 {
        return false;
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return false;
    }
    slug.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Normalize a body for hashing: unify line endings and strip outer
/// whitespace, so cosmetic regeneration differences do not change identity.
pub fn normalize_body(body: &str) -> String {
    body.replace("\r\n", "\n").trim().to_string()
}

/// Content hash of a candidate: SHA-256 over the normalized body plus the
/// fields that define what the document *is* (slug, topic key, title).
/// Timestamps are deliberately excluded so identical regenerated content
/// hashes identically.
pub fn content_hash(candidate: &CandidateDocument) -> String {
    let mut hasher = Sha256::new();
    hasher.update(candidate.slug.as_bytes());
    hasher.update([0u8]);
    hasher.update(candidate.topic_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(candidate.title.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_body(&candidate.body).as_bytes());
    format!("{:x}", hasher.finalize())
}
