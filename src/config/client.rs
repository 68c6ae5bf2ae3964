use serde::Deserialize;
use serde::Serialize;

/// Source synchronized by the `flagsync` binary.
///
/// The library never reads this section; embedders pass a [`crate::ConfigKey`]
/// to [`crate::Repository::load`] directly.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ClientConfig {
    /// Features server base url, e.g. "https://cdn.example.com"
    #[serde(default)]
    pub api_host: String,

    /// Access key appended to the features path
    #[serde(default)]
    pub client_key: String,

    /// Keep a realtime stream open for the key
    #[serde(default)]
    pub streaming: bool,

    /// Per-load TTL override (milliseconds)
    #[serde(default)]
    pub ttl_override_ms: Option<u64>,
}
