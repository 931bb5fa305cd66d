//! # Engine Configuration
//!
//! Settings are read from JSON and can be overridden per variable from the
//! environment:
//!
//! | Variable              | Field           | Default |
//! |-----------------------|-----------------|---------|
//! | `BPKIO_CONCURRENCY`   | `concurrency`   | `4`     |
//! | `BPKIO_REFRESH`       | `refresh`       | `false` |
//! | `BPKIO_ALLOW_REPLACE` | `allow_replace` | `false` |
//! | `BPKIO_MAX_RETRIES`   | `max_retries`   | `2`     |
//! | `BPKIO_RETRY_BACKOFF_MS` | `retry_backoff_ms` | `200` |

use crate::controller::ReplacePolicy;
use crate::reconciler::ReconcileOptions;
use serde::{Deserialize, Serialize};

pub const ENV_CONCURRENCY: &str = "BPKIO_CONCURRENCY";
pub const ENV_REFRESH: &str = "BPKIO_REFRESH";
pub const ENV_ALLOW_REPLACE: &str = "BPKIO_ALLOW_REPLACE";
pub const ENV_MAX_RETRIES: &str = "BPKIO_MAX_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "BPKIO_RETRY_BACKOFF_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value {value:?} for {name}")]
    InvalidVariable { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency: usize,
    pub refresh: bool,
    pub allow_replace: bool,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            refresh: false,
            allow_replace: false,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.checked()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            self.concurrency = parse_number(ENV_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_REFRESH) {
            self.refresh = parse_flag(ENV_REFRESH, &value)?;
        }
        if let Some(value) = lookup(ENV_ALLOW_REPLACE) {
            self.allow_replace = parse_flag(ENV_ALLOW_REPLACE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BACKOFF_MS) {
            self.retry_backoff_ms = parse_number(ENV_RETRY_BACKOFF_MS, &value)?;
        }
        self.checked()
    }

    fn checked(self) -> Result<Self, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidVariable {
                name: ENV_CONCURRENCY,
                value: "0".to_string(),
            });
        }
        Ok(self)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            concurrency: self.concurrency,
            refresh: self.refresh,
            replace_policy: if self.allow_replace {
                ReplacePolicy::Allow
            } else {
                ReplacePolicy::Deny
            },
            max_retries: self.max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }
}

fn parse_number<N: std::str::FromStr>(name: &'static str, value: &str) -> Result<N, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVariable {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidVariable {
            name,
            value: value.to_string(),
        }),
    }
}
