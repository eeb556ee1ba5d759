//! Client configuration.
//!
//! Read from a TOML file, then overridden by `ATOLYE_*` environment variables:
//!
//! ```toml
//! store_url = "http://127.0.0.1:8080"
//! api_key = "secret"
//! poll_interval_ms = 5000
//! request_timeout_ms = 10000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_STORE_URL: &str = "ATOLYE_STORE_URL";
pub const ENV_API_KEY: &str = "ATOLYE_API_KEY";
pub const ENV_POLL_INTERVAL_MS: &str = "ATOLYE_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "ATOLYE_REQUEST_TIMEOUT_MS";

/// Errors from loading or validating a [`SyncConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse config: {message}")]
    Parse { message: String },

    #[error("invalid value for {key}: '{value}' ({message})")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the ledger store.
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Bearer token sent with every store request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Full-ledger refetch period while no push channel is connected.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single store request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_store_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            store_url: default_store_url(),
            api_key: None,
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// File (or defaults when `path` is `None`), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `ATOLYE_*` overrides looked up through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_STORE_URL) {
            self.store_url = url;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(raw) = get(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_millis(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = parse_millis(ENV_REQUEST_TIMEOUT_MS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval_ms".to_string(),
                value: "0".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms".to_string(),
                value: "0".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if !(self.store_url.starts_with("http://") || self.store_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "store_url".to_string(),
                value: self.store_url.clone(),
                message: "expected an http:// or https:// URL".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            message: e.to_string(),
        })
}
