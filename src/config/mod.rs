//! Configuration management module for the feature sync client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod cache;
mod client;
mod fetch;
mod monitoring;
mod retry;
mod storage;
mod stream;
pub use cache::*;
pub use client::*;
pub use fetch::*;
pub use monitoring::*;
pub use retry::*;
pub use storage::*;
pub use stream::*;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "FLAGSYNC_CONFIG_PATH";

/// Prefix of environment variable overrides (`FLAGSYNC__CACHE__DEFAULT_TTL_MS=...`)
const ENV_PREFIX: &str = "FLAGSYNC";

/// Main configuration container for the sync client
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `FLAGSYNC_CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Cache TTL and persistence behaviour
    #[serde(default)]
    pub cache: CacheConfig,
    /// Features endpoint and retry policy
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Realtime channel parameters
    #[serde(default)]
    pub stream: StreamConfig,
    /// Durable snapshot backend
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metrics exposition
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Source the binary synchronizes
    #[serde(default)]
    pub client: ClientConfig,
}

impl Debug for Settings {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("cache", &self.cache)
            .field("storage", &self.storage)
            .field("client", &self.client)
            .finish()
    }
}

impl Settings {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `FLAGSYNC_CONFIG_PATH` (if set)
    /// 3. Environment variables with `FLAGSYNC__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied with
    /// [`Settings::with_override_config`]. Call [`Settings::validate`] last.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("FLAGSYNC__CACHE__DEFAULT_TTL_MS", "30000");
    /// let settings = Settings::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let settings: Self = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.fetch.validate()?;
        self.stream.validate()?;
        self.storage.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Builds a configuration error carrying `message`
pub(crate) fn invalid(message: impl Into<String>) -> crate::Error {
    crate::Error::Config(config::ConfigError::Message(message.into()))
}
