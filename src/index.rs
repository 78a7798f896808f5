//! Listing index: the derived, bounded projection of the document store.
//!
//! The index is a single JSON file holding one [`IndexEntry`] per listed
//! document, sorted by slug. It is always either a complete valid file or
//! absent; mutation happens only under the index lock as load, mutate in
//! memory, atomic write. A load that finds a corrupt file does not fail
//! the caller: it rebuilds the index from the document store, because the
//! store is the source of truth and the index is always derivable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::error::IndexError;
use crate::gate::ValidationGate;
use crate::lock::IndexLock;
use crate::models::{Document, IndexEntry};
use crate::store::DocumentStore;

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// The complete index as serialized to disk.
///
/// `updated_at` is derived from the entries (the maximum entry timestamp,
/// epoch when empty) rather than taken from the wall clock, so rebuilding
/// an unchanged corpus reproduces the file byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingIndex {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl ListingIndex {
    pub fn empty() -> ListingIndex {
        ListingIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            entries: Vec::new(),
        }
    }

    /// Build an index from scratch. Entries are sorted by slug; the caller
    /// guarantees slug uniqueness (one file per slug in the store).
    pub fn from_entries(mut entries: Vec<IndexEntry>) -> ListingIndex {
        entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        let mut index = ListingIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            entries,
        };
        index.derive_updated_at();
        index
    }

    /// Insert or replace the entry for its slug, keeping sort order.
    /// Replacing is only allowed for the same document id; a second
    /// document claiming an occupied slug is a collision, not an update.
    pub fn upsert(&mut self, entry: IndexEntry) -> Result<(), IndexError> {
        match self
            .entries
            .binary_search_by(|e| e.slug.as_str().cmp(entry.slug.as_str()))
        {
            Ok(pos) => {
                if self.entries[pos].id != entry.id {
                    return Err(IndexError::DuplicateSlug { slug: entry.slug });
                }
                self.entries[pos] = entry;
            }
            Err(pos) => self.entries.insert(pos, entry),
        }
        self.derive_updated_at();
        Ok(())
    }

    /// Remove the entry for `slug`. Returns whether one was present.
    pub fn remove(&mut self, slug: &str) -> bool {
        match self
            .entries
            .binary_search_by(|e| e.slug.as_str().cmp(slug))
        {
            Ok(pos) => {
                self.entries.remove(pos);
                self.derive_updated_at();
                true
            }
            Err(_) => false,
        }
    }

    pub fn find(&self, slug: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.slug.as_str().cmp(slug))
            .ok()
            .map(|pos| &self.entries[pos])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical serialization. Every writer of the index file goes
    /// through this, which is what makes rebuild idempotence meaningful.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let mut bytes = serde_json::to_vec_pretty(self)
            .map_err(|source| IndexError::Serialize { source })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn parse(bytes: &[u8]) -> Result<ListingIndex, IndexError> {
        let mut index: ListingIndex =
            serde_json::from_slice(bytes).map_err(|e| IndexError::Corrupt {
                reason: e.to_string(),
            })?;
        if index.schema_version != INDEX_SCHEMA_VERSION {
            return Err(IndexError::Corrupt {
                reason: format!("unsupported schema_version {}", index.schema_version),
            });
        }
        // A hand-edited file may be unsorted; normalize rather than reject.
        index.entries.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(index)
    }

    fn derive_updated_at(&mut self) {
        self.updated_at = self
            .entries
            .iter()
            .map(|e| e.updated_at)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    }
}

/// Persistence wrapper that owns the index file, its lock, and the pieces
/// needed to regenerate the index when a load finds it corrupt.
#[derive(Clone)]
pub struct ListingIndexStore {
    path: PathBuf,
    lock: IndexLock,
    store: DocumentStore,
    gate: ValidationGate,
    max_tags: usize,
    max_keywords: usize,
}

impl ListingIndexStore {
    pub fn from_config(config: &Config) -> ListingIndexStore {
        ListingIndexStore {
            path: config.index_path(),
            lock: IndexLock::from_config(config),
            store: DocumentStore::from_config(config),
            gate: ValidationGate::from_config(config),
            max_tags: config.index.max_tags,
            max_keywords: config.index.max_keywords,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project a document with this index's field caps.
    pub fn project(&self, doc: &Document) -> IndexEntry {
        IndexEntry::project(doc, self.max_tags, self.max_keywords)
    }

    /// Insert or replace one entry under the lock.
    pub async fn upsert_entry(&self, mut entry: IndexEntry) -> Result<(), IndexError> {
        entry.tags.truncate(self.max_tags);
        entry.keywords.truncate(self.max_keywords);
        self.lock
            .with_lock(move || async move {
                let mut index = self.load_or_rebuild_unlocked()?;
                index.upsert(entry)?;
                self.write_unlocked(&index)
            })
            .await
    }

    /// Remove one entry under the lock. Returns whether it was present.
    pub async fn remove_entry(&self, slug: &str) -> Result<bool, IndexError> {
        let slug = slug.to_string();
        self.lock
            .with_lock(move || async move {
                let mut index = self.load_or_rebuild_unlocked()?;
                let removed = index.remove(&slug);
                if removed {
                    self.write_unlocked(&index)?;
                }
                Ok(removed)
            })
            .await
    }

    /// Replace the whole index under the lock. Used by the rebuilder.
    pub async fn replace(&self, index: &ListingIndex) -> Result<(), IndexError> {
        self.lock
            .with_lock(move || async move { self.write_unlocked(index) })
            .await
    }

    /// Strict read: `None` when the file is absent, `Corrupt` when it is
    /// unparseable. Diagnostics (`press check`) use this; everything else
    /// goes through the self-healing [`ListingIndexStore::load`].
    pub fn read_raw(&self) -> Result<Option<ListingIndex>, IndexError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(IndexError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        ListingIndex::parse(&bytes).map(Some)
    }

    /// Load the index, healing a corrupt file by rebuilding it from the
    /// document store. An absent file is an empty index, not an error.
    pub async fn load(&self) -> Result<ListingIndex, IndexError> {
        match self.read_raw() {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Ok(ListingIndex::empty()),
            Err(IndexError::Corrupt { reason }) => {
                warn!(reason = %reason, "listing index corrupt, rebuilding from document store");
                self.lock
                    .with_lock(move || async move {
                        // Another process may have healed it while we waited.
                        if let Ok(Some(index)) = self.read_raw() {
                            return Ok(index);
                        }
                        self.rebuild_unlocked()
                    })
                    .await
            }
            Err(err) => Err(err),
        }
    }

    fn load_or_rebuild_unlocked(&self) -> Result<ListingIndex, IndexError> {
        match self.read_raw() {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Ok(ListingIndex::empty()),
            Err(IndexError::Corrupt { reason }) => {
                warn!(reason = %reason, "listing index corrupt, rebuilding from document store");
                self.rebuild_unlocked()
            }
            Err(err) => Err(err),
        }
    }

    /// Regenerate the index from the store. Caller holds the lock.
    fn rebuild_unlocked(&self) -> Result<ListingIndex, IndexError> {
        let scan = crate::rebuild::scan_corpus(
            &self.store,
            &self.gate,
            self.max_tags,
            self.max_keywords,
        )
        .map_err(|e| IndexError::Corrupt {
            reason: format!("index unreadable and store scan failed: {}", e),
        })?;
        warn!(
            scanned = scan.report.scanned,
            valid = scan.report.valid,
            "listing index rebuilt from document store"
        );
        let index = ListingIndex::from_entries(scan.entries);
        self.write_unlocked(&index)?;
        Ok(index)
    }

    fn write_unlocked(&self, index: &ListingIndex) -> Result<(), IndexError> {
        let bytes = index.to_bytes()?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}
