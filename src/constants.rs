// -
// Durable storage namespaces

/// Durable storage item holding the serialized cache snapshot
pub(crate) const CACHE_SNAPSHOT_KEY: &str = "flagsync:cache:features";

/// Durable storage item holding the snapshot format version
pub(crate) const CACHE_VERSION_KEY: &str = "flagsync:cache:version";

pub(crate) const CACHE_SNAPSHOT_VERSION: &str = "1";

/// Sled tree used by [`crate::SledStore`]
pub(crate) const SLED_ITEMS_TREE: &str = "_flagsync_items";

// -
// Wire contract

/// Separator between api host and client key in the textual key form
pub(crate) const CONFIG_KEY_SEPARATOR: &str = "||";

/// Stream event tag carrying a full features payload
pub const FEATURES_EVENT: &str = "features";

/// SSE event name used when a frame carries no `event:` field
pub(crate) const SSE_DEFAULT_EVENT: &str = "message";

/// Largest SSE line or event body kept in memory by default
pub(crate) const DEFAULT_MAX_EVENT_BYTES: usize = 1024 * 1024;
