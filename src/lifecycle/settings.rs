//! Settings of the simulated broadpeak.io API.

use reconcile_framework::ConfigError;
use serde::{Deserialize, Serialize};

pub const ENV_BUFFER_SIZE: &str = "BPKIO_BUFFER_SIZE";
pub const ENV_UNREACHABLE_HOSTS: &str = "BPKIO_UNREACHABLE_HOSTS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Request queue length of each store.
    pub buffer_size: usize,
    /// Hosts the API fails to fetch from. Subdomains match too.
    pub unreachable_hosts: Vec<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            buffer_size: 32,
            unreachable_hosts: vec!["invalid".to_string(), "this-does-not-exist.example.com".to_string()],
        }
    }
}

impl ApiSettings {
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_BUFFER_SIZE) {
            self.buffer_size = value
                .trim()
                .parse()
                .ok()
                .filter(|size| *size > 0)
                .ok_or(ConfigError::InvalidVariable {
                    name: ENV_BUFFER_SIZE,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_UNREACHABLE_HOSTS) {
            self.unreachable_hosts = value
                .split(',')
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(str::to_ascii_lowercase)
                .collect();
        }
        Ok(self)
    }

    pub fn is_unreachable(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.unreachable_hosts.iter().any(|blocked| {
            host == *blocked
                || host
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
