//! Store configuration.
//!
//! # Responsibility
//! - Describe how an `AssetStore` is opened and how it emits events.
//! - Load configuration from JSON documents.
//!
//! # Invariants
//! - Missing fields fall back to `StoreConfig::default()`.
//! - Unknown fields are rejected so typos do not silently change behavior.

use crate::db::{DbTarget, DEFAULT_BUSY_TIMEOUT};
use crate::query::executor::CascadeEventPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite file. `None` keeps the store in memory.
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub event_policy: CascadeEventPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            event_policy: CascadeEventPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn event_policy(mut self, policy: CascadeEventPolicy) -> Self {
        self.event_policy = policy;
        self
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::from_json_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.db_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("db_path cannot be empty".to_string()));
            }
        }
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "busy_timeout_ms must be <= {MAX_BUSY_TIMEOUT_MS}, got {}",
                self.busy_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn db_target(&self) -> DbTarget {
        match &self.db_path {
            Some(path) => DbTarget::File(path.clone()),
            None => DbTarget::Memory,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
