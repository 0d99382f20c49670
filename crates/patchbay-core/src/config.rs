//! Router configuration.
//!
//! Settings are read from TOML, never written back. Missing keys fall back to
//! their defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! sample_rate = 48000
//! chunk_size = 512
//! stop_timeout_ms = 2000
//! startup_timeout_ms = 2000
//! retry_backoff_ms = 100
//! ```
//!
//! # Location
//!
//! - Linux: `~/.config/patchbay/patchbay.toml`
//! - macOS: `~/Library/Application Support/patchbay/patchbay.toml`
//! - Windows: `%APPDATA%\patchbay\patchbay.toml`

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for directory paths.
const APP_NAME: &str = "patchbay";

/// File name of the configuration file.
const CONFIG_FILE: &str = "patchbay.toml";

/// Tunables for the router and its route workers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Default sample rate for new routes, in Hz.
    pub sample_rate: u32,
    /// Default frames per chunk for new routes.
    pub chunk_size: u32,
    /// How long `stop_route` waits for a worker to terminate.
    pub stop_timeout_ms: u64,
    /// How long `create_route` waits for both streams to open.
    pub startup_timeout_ms: u64,
    /// Pause after a transient I/O fault before the next chunk.
    pub retry_backoff_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_size: 1024,
            stop_timeout_ms: 2000,
            startup_timeout_ms: 2000,
            retry_backoff_ms: 100,
        }
    }
}

impl RouterConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load the user configuration file if it exists, defaults otherwise.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject values no route could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sample_rate",
                reason: "must be positive".into(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// [`stop_timeout_ms`](Self::stop_timeout_ms) as a duration.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// [`startup_timeout_ms`](Self::startup_timeout_ms) as a duration.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// [`retry_backoff_ms`](Self::retry_backoff_ms) as a duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the configuration file inside [`user_config_dir`].
pub fn default_config_path() -> PathBuf {
    user_config_dir().join(CONFIG_FILE)
}
