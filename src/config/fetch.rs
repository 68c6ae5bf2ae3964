use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::BackoffPolicy;
use crate::Result;

/// Features endpoint settings used by [`crate::HttpFetcher`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FetchConfig {
    /// Path appended to the api host, followed by `/{client_key}`
    /// Default: "/api/features"
    #[serde(default = "default_features_path")]
    pub features_path: String,

    /// Retry policy for a single logical fetch. `timeout_ms` bounds each attempt.
    #[serde(default = "default_fetch_retry")]
    pub retry: BackoffPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            features_path: default_features_path(),
            retry: default_fetch_retry(),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.features_path.starts_with('/') {
            return Err(invalid(format!(
                "fetch.features_path must start with '/', got {:?}",
                self.features_path
            )));
        }
        // a cold load blocks on this policy, so it has to terminate
        if self.retry.max_retries == 0 {
            return Err(invalid("fetch.retry.max_retries must be greater than 0"));
        }
        self.retry.validate("fetch.retry")
    }
}

fn default_features_path() -> String {
    "/api/features".into()
}
fn default_fetch_retry() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 10_000,
        base_delay_ms: 200,
        max_delay_ms: 5_000,
    }
}
