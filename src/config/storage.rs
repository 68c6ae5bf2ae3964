//! Durable snapshot backend configuration

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Which [`crate::DurableStore`] backs the cache mirror
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map; nothing survives a restart
    #[default]
    Memory,
    /// Embedded sled database under `db_path`
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Default: memory
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database directory for the sled backend
    /// Default: "./db/flagsync"
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Sled && self.db_path.as_os_str().is_empty() {
            return Err(invalid("storage.db_path cannot be empty for the sled backend"));
        }
        Ok(())
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./db/flagsync")
}
