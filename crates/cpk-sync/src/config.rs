use std::path::Path;
use std::time::Duration;

use cpk_types::RefName;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_BRANCH: &str = "master";

/// Tunables for a [`SyncEngine`](crate::SyncEngine).
///
/// ```toml
/// max_chain_length = 1000000
/// local_branch = "master"
///
/// [retry]
/// max_attempts = 5
/// base_delay_ms = 50
/// max_delay_ms = 2000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub retry: RetryConfig,
    /// Upper bound on push records visited in one pull.
    pub max_chain_length: usize,
    /// Branch that pull and clone move to the remote head.
    pub local_branch: RefName,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_chain_length: 1_000_000,
            local_branch: RefName::new(DEFAULT_BRANCH).unwrap_or_else(|_| unreachable!()),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
