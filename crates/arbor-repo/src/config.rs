//! Repository configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arbor_index::IndexConfig;
use arbor_types::BranchName;

use crate::error::{RepoError, RepoResult};

/// Retry policy for [`Repository::run_transaction`](crate::Repository::run_transaction).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Retries after the first attempt before giving up.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay.
    pub backoff_max_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_base_ms: 1,
            backoff_max_ms: 100,
        }
    }
}

impl TransactionConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << shift)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Top-level configuration of a [`Repository`](crate::Repository).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Branch created at startup. It cannot be deleted.
    pub default_branch: BranchName,
    pub transaction: TransactionConfig,
    pub index: IndexConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_branch: BranchName::main(),
            transaction: TransactionConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl RepositoryConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded repository config");
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepoError::Config(e.to_string()))
    }
}
