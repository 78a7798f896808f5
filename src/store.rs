//! Per-slug document store.
//!
//! One JSON file per document, named `<slug>.json`, under the documents
//! directory. The slug is the sole file-system identity; all writes go
//! through the atomic writer, so a document file is always either the
//! previous complete version or the new complete version.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::atomic::write_atomic;
use crate::config::Config;
use crate::error::StoreError;
use crate::models::{is_valid_slug, Document};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

/// Outcome of a successful `put`.
#[derive(Debug, Clone, Copy)]
pub struct PutOutcome {
    /// True when the slug had no file before this write. Callers use this
    /// to decide whether a failed follow-up step may delete the file.
    pub created: bool,
}

impl DocumentStore {
    pub fn new(dir: PathBuf) -> DocumentStore {
        DocumentStore { dir }
    }

    pub fn from_config(config: &Config) -> DocumentStore {
        DocumentStore::new(config.documents_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug))
    }

    /// Write a document under its slug.
    ///
    /// Without `allow_overwrite` an existing file fails with
    /// `AlreadyExists`. With it, the old file is parsed first and the
    /// content hashes are compared: identical content overwrites freely;
    /// changed content is only accepted when the logical topic matches,
    /// so a reused slug can never silently discard an unrelated document.
    pub fn put(&self, doc: &Document, allow_overwrite: bool) -> Result<PutOutcome, StoreError> {
        if !is_valid_slug(&doc.slug) {
            return Err(StoreError::InvalidSlug {
                slug: doc.slug.clone(),
            });
        }

        let path = self.document_path(&doc.slug);
        let created = !path.exists();
        if !created {
            if !allow_overwrite {
                return Err(StoreError::AlreadyExists {
                    slug: doc.slug.clone(),
                });
            }
            let old = self.read_existing(&doc.slug, &path)?;
            if old.content_hash != doc.content_hash && old.topic_key != doc.topic_key {
                return Err(StoreError::SlugCollision {
                    slug: doc.slug.clone(),
                    existing_topic: old.topic_key,
                });
            }
            debug!(slug = %doc.slug, "overwriting existing document");
        }

        let mut bytes = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Serialize {
            slug: doc.slug.clone(),
            source,
        })?;
        bytes.push(b'\n');
        write_atomic(&path, &bytes)?;
        Ok(PutOutcome { created })
    }

    /// Load a document by slug. Invalid slugs are unreachable keys and
    /// resolve to `None` rather than touching the file system.
    pub fn get(&self, slug: &str) -> Result<Option<Document>, StoreError> {
        if !is_valid_slug(slug) {
            return Ok(None);
        }
        let path = self.document_path(slug);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            slug: slug.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(doc))
    }

    /// Remove a document file. Returns whether a file existed.
    pub fn delete(&self, slug: &str) -> Result<bool, StoreError> {
        if !is_valid_slug(slug) {
            return Ok(false);
        }
        let path = self.document_path(slug);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Lazy scan over every document file, in slug order, yielding raw
    /// bytes. Parsing and validation are the caller's policy; only the
    /// rebuilder and `check` walk the whole store. `.tmp` leftovers and
    /// foreign files are skipped.
    pub fn scan_all(&self) -> Result<ScanAll, StoreError> {
        let mut paths: Vec<(String, PathBuf)> = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ScanAll { paths, next: 0 })
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            paths.push((stem.to_string(), path));
        }
        // Deterministic order makes rebuild output reproducible.
        paths.sort();
        Ok(ScanAll { paths, next: 0 })
    }

    /// Number of document files, without reading any of them.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.scan_all()?.paths.len())
    }

    fn read_existing(&self, slug: &str, path: &Path) -> Result<Document, StoreError> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            slug: slug.to_string(),
            reason: format!("{} (delete the file or run `press rebuild`)", e),
        })
    }
}

/// Iterator over `(slug, raw bytes)` pairs from [`DocumentStore::scan_all`].
/// File contents are read lazily, one file per step.
pub struct ScanAll {
    paths: Vec<(String, PathBuf)>,
    next: usize,
}

impl Iterator for ScanAll {
    type Item = Result<(String, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (slug, path) = self.paths.get(self.next)?.clone();
            self.next += 1;
            match std::fs::read(&path) {
                Ok(bytes) => return Some(Ok((slug, bytes))),
                // Deleted mid-scan; the sequence stays finite and moves on.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Some(Err(StoreError::Io { path, source })),
            }
        }
    }
}
