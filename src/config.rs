use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub invalidator: InvalidatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Root directory holding documents/, index.json, ledger.json,
    /// metrics.json, and the lock marker.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: default_max_wait_ms(),
            stale_after_ms: default_stale_after_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_max_wait_ms() -> u64 {
    30_000
}
fn default_stale_after_ms() -> u64 {
    120_000
}
fn default_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default = "default_required_markers")]
    pub required_markers: Vec<String>,
    #[serde(default = "default_banned_patterns")]
    pub banned_patterns: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            required_markers: default_required_markers(),
            banned_patterns: default_banned_patterns(),
        }
    }
}

fn default_min_word_count() -> usize {
    120
}
fn default_required_markers() -> Vec<String> {
    vec!["# ".to_string()]
}
fn default_banned_patterns() -> Vec<String> {
    vec![
        "lorem ipsum".to_string(),
        "as an ai language model".to_string(),
        "{{".to_string(),
        "[insert ".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_tags: default_max_tags(),
            max_keywords: default_max_keywords(),
        }
    }
}

fn default_max_tags() -> usize {
    8
}
fn default_max_keywords() -> usize {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// A `pending` reservation older than this is treated as abandoned
    /// (crashed publisher) and may be reclaimed by the next caller.
    #[serde(default = "default_pending_stale_after_ms")]
    pub pending_stale_after_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            pending_stale_after_ms: default_pending_stale_after_ms(),
        }
    }
}

fn default_pending_stale_after_ms() -> u64 {
    600_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,
    #[serde(default = "default_top_failures_capacity")]
    pub top_failures_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            recent_capacity: default_recent_capacity(),
            top_failures_capacity: default_top_failures_capacity(),
        }
    }
}

fn default_recent_capacity() -> usize {
    50
}
fn default_top_failures_capacity() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct InvalidatorConfig {
    #[serde(default = "default_invalidator_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_invalidator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InvalidatorConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: None,
            timeout_secs: default_invalidator_timeout_secs(),
        }
    }
}

fn default_invalidator_provider() -> String {
    "disabled".to_string()
}
fn default_invalidator_timeout_secs() -> u64 {
    10
}

impl InvalidatorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Minimal config rooted at `root`, with every tunable at its default.
    /// Used by tests and by `press init`.
    pub fn with_root(root: impl Into<PathBuf>) -> Config {
        Config {
            store: StoreConfig { root: root.into() },
            lock: LockConfig::default(),
            validation: ValidationConfig::default(),
            index: IndexConfig::default(),
            ledger: LedgerConfig::default(),
            metrics: MetricsConfig::default(),
            invalidator: InvalidatorConfig::default(),
        }
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.store.root.join("documents")
    }

    pub fn index_path(&self) -> PathBuf {
        self.store.root.join("index.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.store.root.join("ledger.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.store.root.join("metrics.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store.root.join("index.lock")
    }

    pub fn lock_max_wait(&self) -> Duration {
        Duration::from_millis(self.lock.max_wait_ms)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_millis(self.lock.stale_after_ms)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock.poll_interval_ms)
    }

    pub fn pending_stale_after(&self) -> Duration {
        Duration::from_millis(self.ledger.pending_stale_after_ms)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate lock
    if config.lock.max_wait_ms == 0 {
        anyhow::bail!("lock.max_wait_ms must be > 0");
    }
    if config.lock.stale_after_ms == 0 {
        anyhow::bail!("lock.stale_after_ms must be > 0");
    }
    if config.lock.poll_interval_ms == 0 {
        anyhow::bail!("lock.poll_interval_ms must be > 0");
    }
    if config.lock.poll_interval_ms > config.lock.max_wait_ms {
        anyhow::bail!("lock.poll_interval_ms must not exceed lock.max_wait_ms");
    }

    // Validate bounded capacities
    if config.metrics.recent_capacity == 0 {
        anyhow::bail!("metrics.recent_capacity must be > 0");
    }
    if config.metrics.top_failures_capacity == 0 {
        anyhow::bail!("metrics.top_failures_capacity must be > 0");
    }
    if config.index.max_tags == 0 {
        anyhow::bail!("index.max_tags must be > 0");
    }
    if config.index.max_keywords == 0 {
        anyhow::bail!("index.max_keywords must be > 0");
    }

    // Validate invalidator
    if config.invalidator.is_enabled() && config.invalidator.endpoint.is_none() {
        anyhow::bail!(
            "invalidator.endpoint must be specified when provider is '{}'",
            config.invalidator.provider
        );
    }
    match config.invalidator.provider.as_str() {
        "disabled" | "http" => {}
        other => anyhow::bail!(
            "Unknown invalidator provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    Ok(config)
}
