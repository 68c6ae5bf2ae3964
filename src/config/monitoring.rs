use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Metrics endpoint of the `flagsync` binary. The library itself only
/// records into [`crate::metrics::REGISTRY`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Serve `GET /metrics` alongside the sync loop
    /// Default: false
    #[serde(default = "default_prometheus_enabled")]
    pub prometheus_enabled: bool,

    /// Listen port on all interfaces
    /// Default: 9464
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: default_prometheus_enabled(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        // 0 would bind an ephemeral port nobody can scrape
        if self.prometheus_enabled && self.prometheus_port == 0 {
            return Err(invalid("monitoring.prometheus_port cannot be 0 when the metrics endpoint is enabled"));
        }
        Ok(())
    }
}

fn default_prometheus_enabled() -> bool {
    false
}
fn default_prometheus_port() -> u16 {
    9464
}
