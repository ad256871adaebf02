//! Read and display settings
//!
//! One explicit [`ReadConfig`] value is loaded at startup and passed down to
//! the read session and the trip decorators. Nothing here is global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use farecard_card::AccessOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Display-time corrections applied to trips
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationConfig {
    /// Shift trip dates by a random number of days
    pub dates: bool,
    /// Scale fares by a random factor
    pub fares: bool,
    /// Fixed seed for repeatable output; random when unset
    pub seed: Option<u64>,
}

/// Settings for reading and presenting one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Attempts per candidate key
    pub retry_limit: u32,

    /// Tab-separated key file, see `farecard_keys::KeyFile`
    pub keys_file: Option<PathBuf>,

    pub obfuscation: ObfuscationConfig,

    /// How long a cancelled read may take to wind down
    pub cancel_timeout_ms: u64,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            keys_file: None,
            obfuscation: ObfuscationConfig::default(),
            cancel_timeout_ms: 2000,
        }
    }
}

impl ReadConfig {
    pub const RETRY_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default location, or defaults when no file exists there
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// `farecard.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "farecard")
            .map(|dirs| dirs.config_dir().join("farecard.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !Self::RETRY_RANGE.contains(&self.retry_limit) {
            return Err(ConfigError::Validation(format!(
                "retry_limit must be between {} and {}, got {}",
                Self::RETRY_RANGE.start(),
                Self::RETRY_RANGE.end(),
                self.retry_limit
            )));
        }
        if self.cancel_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "cancel_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn access_options(&self) -> AccessOptions {
        AccessOptions {
            retry_limit: self.retry_limit,
            ..AccessOptions::default()
        }
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}
