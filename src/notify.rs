//! Downstream cache invalidation.
//!
//! After a successful publish the core tells the serving layer which paths
//! changed. This is strictly best-effort: the document is already durably
//! committed by the time notify runs, so a failure is logged and metered
//! but never rolls back or fails the publish.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::Config;

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, paths: &[String]) -> Result<()>;
}

/// Default provider: accept and discard every notification.
pub struct DisabledInvalidator;

#[async_trait]
impl CacheInvalidator for DisabledInvalidator {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn notify(&self, paths: &[String]) -> Result<()> {
        debug!(count = paths.len(), "cache invalidation disabled, dropping paths");
        Ok(())
    }
}

/// POSTs `{"paths": [...]}` to a configured endpoint. One attempt, no
/// retries; the publish path must not stall on a slow cache.
pub struct HttpInvalidator {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpInvalidator {
    pub fn new(endpoint: String, timeout_secs: u64) -> Result<HttpInvalidator> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client for cache invalidator")?;
        Ok(HttpInvalidator { endpoint, client })
    }
}

#[async_trait]
impl CacheInvalidator for HttpInvalidator {
    fn name(&self) -> &str {
        "http"
    }

    async fn notify(&self, paths: &[String]) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "paths": paths }))
            .send()
            .await
            .with_context(|| format!("cache invalidation request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "cache invalidation endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            );
        }
        debug!(count = paths.len(), "cache invalidation accepted");
        Ok(())
    }
}

pub fn create_invalidator(config: &Config) -> Result<Box<dyn CacheInvalidator>> {
    match config.invalidator.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledInvalidator)),
        "http" => {
            let endpoint = config
                .invalidator
                .endpoint
                .clone()
                .context("invalidator.endpoint is required for the http provider")?;
            Ok(Box::new(HttpInvalidator::new(
                endpoint,
                config.invalidator.timeout_secs,
            )?))
        }
        other => bail!(
            "Unknown invalidator provider: '{}'. Must be disabled or http.",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_invalidator_accepts_everything() {
        let invalidator = DisabledInvalidator;
        assert_eq!(invalidator.name(), "disabled");
        invalidator
            .notify(&["/".to_string(), "/guides/".to_string()])
            .await
            .unwrap();
    }

    #[test]
    fn factory_defaults_to_disabled() {
        let config = Config::with_root("/tmp/unused");
        let invalidator = create_invalidator(&config).unwrap();
        assert_eq!(invalidator.name(), "disabled");
    }

    #[test]
    fn factory_builds_http_when_configured() {
        let mut config = Config::with_root("/tmp/unused");
        config.invalidator.provider = "http".to_string();
        config.invalidator.endpoint = Some("http://localhost:9999/invalidate".to_string());
        let invalidator = create_invalidator(&config).unwrap();
        assert_eq!(invalidator.name(), "http");
    }

    #[test]
    fn factory_requires_endpoint_for_http() {
        let mut config = Config::with_root("/tmp/unused");
        config.invalidator.provider = "http".to_string();
        assert!(create_invalidator(&config).is_err());
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let mut config = Config::with_root("/tmp/unused");
        config.invalidator.provider = "carrier-pigeon".to_string();
        assert!(create_invalidator(&config).is_err());
    }
}
