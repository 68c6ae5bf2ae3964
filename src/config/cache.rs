use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Cache staleness and durable mirror settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Time after which a cached payload is served stale and refreshed in
    /// the background (milliseconds)
    /// Default: 60000 (1 minute)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Mirror every cache write to the durable store
    /// Default: true
    #[serde(default = "default_persist")]
    pub persist: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            persist: default_persist(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(invalid("cache.default_ttl_ms must be greater than 0"));
        }
        Ok(())
    }
}

fn default_ttl_ms() -> u64 {
    60_000
}
fn default_persist() -> bool {
    true
}
