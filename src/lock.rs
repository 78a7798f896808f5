//! Cross-process index lock.
//!
//! Mutual exclusion for listing-index and ledger mutation is a lock marker
//! file created with exclusive-create semantics: creation fails if the path
//! exists, so at most one process holds the lock. The marker carries an
//! owner token; release deletes the file only when the token still matches,
//! which keeps a slow process from releasing a lock that was reclaimed and
//! re-acquired by someone else. A marker older than the stale threshold is
//! treated as abandoned by a crashed process and reclaimed by any waiter.
//!
//! This is the one file in the system not written through the atomic
//! writer: exclusive create is itself the atomicity mechanism, and a
//! rename-based write would silently replace a live lock.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::error::LockError;

/// Contents of the lock marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub pid: u32,
}

/// Handle to the lock marker file with the owner token baked in.
#[derive(Debug, Clone)]
pub struct IndexLock {
    path: PathBuf,
    max_wait: Duration,
    stale_after: Duration,
    poll_interval: Duration,
}

impl IndexLock {
    pub fn new(
        path: PathBuf,
        max_wait: Duration,
        stale_after: Duration,
        poll_interval: Duration,
    ) -> IndexLock {
        IndexLock {
            path,
            max_wait,
            stale_after,
            poll_interval,
        }
    }

    pub fn from_config(config: &Config) -> IndexLock {
        IndexLock::new(
            config.lock_path(),
            config.lock_max_wait(),
            config.lock_stale_after(),
            config.lock_poll_interval(),
        )
    }

    /// Acquire the lock, polling until `max_wait` elapses.
    ///
    /// A marker older than `stale_after` is deleted and the create is
    /// retried immediately; both the record timestamp and, for an
    /// unparseable marker, the file mtime count as its age.
    pub async fn acquire(&self) -> Result<LockGuard, LockError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let start = Instant::now();
        loop {
            let record = LockRecord {
                owner: Uuid::new_v4().to_string(),
                acquired_at: Utc::now(),
                pid: std::process::id(),
            };
            match try_create(&self.path, &record) {
                Ok(()) => {
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        owner: record.owner,
                        released: false,
                    })
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.holder_is_stale() {
                        warn!(
                            path = %self.path.display(),
                            "reclaiming stale index lock"
                        );
                        match std::fs::remove_file(&self.path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(source) => {
                                return Err(LockError::Io {
                                    path: self.path.clone(),
                                    source,
                                })
                            }
                        }
                    }
                    if start.elapsed() >= self.max_wait {
                        return Err(LockError::Timeout {
                            path: self.path.clone(),
                            waited_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Acquire, run `fn`, release on every exit path, propagate `fn`'s
    /// result. The guard's `Drop` covers the panic path; a failed release
    /// after a successful operation is logged and swallowed because the
    /// work is already durable and stale reclamation recovers the marker.
    pub async fn with_lock<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire().await.map_err(E::from)?;
        let result = f().await;
        if let Err(err) = guard.release() {
            warn!("failed to release index lock: {err}");
        }
        result
    }

    /// Delete the marker regardless of owner. Operator escape hatch;
    /// returns the record that was removed, if one was readable.
    pub fn force_release(&self) -> Result<Option<LockRecord>, LockError> {
        let record = read_record(&self.path);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(record),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn holder_is_stale(&self) -> bool {
        match marker_age(&self.path) {
            Some(age) => age >= self.stale_after,
            // Marker vanished between the failed create and the age probe.
            None => true,
        }
    }
}

/// Guard proving lock ownership. Dropping it releases best-effort;
/// call [`LockGuard::release`] to observe release errors.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    owner: String,
    released: bool,
}

impl LockGuard {
    /// Delete the marker if the owner token still matches. A mismatch
    /// means the lock was reclaimed out from under us; the marker is left
    /// alone and a warning is logged.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        release_owned(&self.path, &self.owner)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            let _ = release_owned(&self.path, &self.owner);
        }
    }
}

fn try_create(path: &Path, record: &LockRecord) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(&body)?;
    file.sync_all()?;
    Ok(())
}

fn release_owned(path: &Path, owner: &str) -> Result<(), LockError> {
    match read_record(path) {
        Some(record) if record.owner == owner => match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        },
        Some(record) => {
            warn!(
                owner = %record.owner,
                "index lock no longer ours, leaving marker in place"
            );
            Ok(())
        }
        // Already gone, or unreadable. Either way there is nothing of ours
        // to delete.
        None => Ok(()),
    }
}

pub(crate) fn read_record(path: &Path) -> Option<LockRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Age of the marker: from its record timestamp when parseable, otherwise
/// from the file mtime (a crashed writer can leave a truncated marker).
fn marker_age(path: &Path) -> Option<Duration> {
    if let Some(record) = read_record(path) {
        let age = Utc::now().signed_duration_since(record.acquired_at);
        return Some(age.to_std().unwrap_or(Duration::ZERO));
    }
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.elapsed().unwrap_or(Duration::ZERO))
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}

/// Run the `lock status` command: show the current marker, if any.
pub async fn run_lock_status(config: &Config) -> Result<()> {
    let path = config.lock_path();
    if !path.exists() {
        println!("Index lock: not held");
        return Ok(());
    }
    match read_record(&path) {
        Some(record) => {
            let age = Utc::now().signed_duration_since(record.acquired_at);
            let stale = age.to_std().unwrap_or(Duration::ZERO) >= config.lock_stale_after();
            println!("Index lock: held{}", if stale { " (STALE)" } else { "" });
            println!("  owner:       {}", record.owner);
            println!("  pid:         {}", record.pid);
            println!(
                "  acquired:    {} ({})",
                record.acquired_at.to_rfc3339(),
                format_age(age)
            );
            println!(
                "  stale after: {}s",
                config.lock_stale_after().as_secs()
            );
        }
        None => {
            println!("Index lock: held (marker unparseable)");
            println!("  path: {}", path.display());
        }
    }
    Ok(())
}

/// Run the `lock release` command: force-delete the marker.
pub async fn run_lock_release(config: &Config) -> Result<()> {
    let lock = IndexLock::from_config(config);
    let was_present = config.lock_path().exists();
    match lock.force_release()? {
        Some(record) => {
            println!("Released index lock held by {} (pid {})", record.owner, record.pid);
        }
        None if was_present => println!("Released index lock (marker was unparseable)"),
        None => println!("Index lock: not held"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quick_lock(dir: &TempDir) -> IndexLock {
        IndexLock::new(
            dir.path().join("index.lock"),
            Duration::from_millis(200),
            Duration::from_secs(60),
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn acquire_release_reacquire() {
        let dir = TempDir::new().unwrap();
        let lock = quick_lock(&dir);

        let guard = lock.acquire().await.unwrap();
        assert!(lock.path().exists());
        guard.release().unwrap();
        assert!(!lock.path().exists());

        let guard = lock.acquire().await.unwrap();
        guard.release().unwrap();
    }

    #[tokio::test]
    async fn contended_acquire_times_out() {
        let dir = TempDir::new().unwrap();
        let lock = quick_lock(&dir);

        let _guard = lock.acquire().await.unwrap();
        match lock.acquire().await {
            Err(LockError::Timeout { waited_ms, .. }) => assert!(waited_ms >= 200),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn stale_marker_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let lock = IndexLock::new(
            dir.path().join("index.lock"),
            Duration::from_millis(200),
            Duration::from_secs(60),
            Duration::from_millis(20),
        );
        let stale = LockRecord {
            owner: "dead-owner".to_string(),
            acquired_at: Utc::now() - chrono::Duration::hours(1),
            pid: 1,
        };
        std::fs::write(
            lock.path(),
            serde_json::to_vec_pretty(&stale).unwrap(),
        )
        .unwrap();

        let guard = lock.acquire().await.unwrap();
        assert_ne!(guard.owner(), "dead-owner");
        guard.release().unwrap();
    }

    #[tokio::test]
    async fn unparseable_marker_ages_by_mtime() {
        let dir = TempDir::new().unwrap();
        let lock = IndexLock::new(
            dir.path().join("index.lock"),
            Duration::from_millis(300),
            Duration::from_millis(50),
            Duration::from_millis(20),
        );
        std::fs::write(lock.path(), b"not json").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let guard = lock.acquire().await.unwrap();
        guard.release().unwrap();
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn release_leaves_foreign_marker_alone() {
        let dir = TempDir::new().unwrap();
        let lock = quick_lock(&dir);

        let guard = lock.acquire().await.unwrap();
        let foreign = LockRecord {
            owner: "someone-else".to_string(),
            acquired_at: Utc::now(),
            pid: 2,
        };
        std::fs::write(
            lock.path(),
            serde_json::to_vec_pretty(&foreign).unwrap(),
        )
        .unwrap();

        guard.release().unwrap();
        assert!(lock.path().exists(), "foreign marker must survive release");
        std::fs::remove_file(lock.path()).unwrap();
    }

    #[tokio::test]
    async fn with_lock_releases_on_error() {
        let dir = TempDir::new().unwrap();
        let lock = quick_lock(&dir);

        let result: Result<(), LockError> = lock
            .with_lock(|| async {
                Err(LockError::Timeout {
                    path: PathBuf::from("fake"),
                    waited_ms: 0,
                })
            })
            .await;
        assert!(result.is_err());
        assert!(!lock.path().exists(), "lock must be released after an error");

        let guard = lock.acquire().await.unwrap();
        guard.release().unwrap();
    }

    #[tokio::test]
    async fn force_release_removes_any_marker() {
        let dir = TempDir::new().unwrap();
        let lock = quick_lock(&dir);

        let _guard = lock.acquire().await.unwrap();
        let removed = lock.force_release().unwrap();
        assert!(removed.is_some());
        assert!(!lock.path().exists());
    }
}
