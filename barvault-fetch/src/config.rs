//! Catalog configuration.
//!
//! Passed explicitly into [`Catalog::open`](crate::Catalog::open); nothing is
//! read from ambient global state.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Upper bound on `max_retries`; 2^16 seconds of backoff is already most of a day.
pub const MAX_RETRIES_LIMIT: u32 = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable settings for a [`Catalog`](crate::Catalog).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Root directory of the local Parquet store.
    pub store_root: PathBuf,

    /// Retries after the first failed remote fetch (attempts = max_retries + 1).
    pub max_retries: u32,

    /// Backoff base; the delay after failed attempt `n` is `base * 2^n`.
    pub backoff_base_ms: u64,

    /// Bound on connecting to the remote provider.
    pub connect_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("data/catalog"),
            max_retries: 3,
            backoff_base_ms: 1_000,
            connect_timeout_secs: 10,
        }
    }
}

impl CatalogConfig {
    /// Default settings rooted at `store_root`.
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to load catalog config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store_root must not be empty".into()));
        }
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid("backoff_base_ms must be > 0".into()));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be <= {MAX_RETRIES_LIMIT}, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_base_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
