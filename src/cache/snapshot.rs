//! Durable snapshot format.
//!
//! The snapshot is a JSON array of `[key, entry]` pairs:
//!
//! ```text
//! [["https://cdn.example.com||sdk-abc", {"data": {...}, "staleAt": 1718000000000}], ...]
//! ```
//!
//! `data` is the payload text exactly as received from the server.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::value::RawValue;
use tracing::warn;

use super::CacheEntry;
use crate::ConfigKey;
use crate::Payload;
use crate::StorageError;

#[derive(Serialize)]
struct SnapshotEntryRef<'a> {
    data: &'a Payload,
    #[serde(rename = "staleAt")]
    stale_at: u64,
}

#[derive(Deserialize)]
struct SnapshotEntry {
    data: Payload,
    #[serde(rename = "staleAt")]
    stale_at: u64,
}

/// Serializes every entry, ordered by key
pub(crate) fn encode_snapshot(entries: &HashMap<ConfigKey, Arc<CacheEntry>>) -> Result<String, StorageError> {
    let mut pairs: Vec<(&ConfigKey, SnapshotEntryRef<'_>)> = entries
        .iter()
        .map(|(key, entry)| {
            (
                key,
                SnapshotEntryRef {
                    data: entry.payload(),
                    stale_at: entry.stale_at_millis(),
                },
            )
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    serde_json::to_string(&pairs).map_err(StorageError::Serialize)
}

/// Parses a snapshot. A malformed document is an error; a malformed entry
/// inside a well-formed document is logged and skipped.
pub(crate) fn decode_snapshot(text: &str) -> Result<Vec<(ConfigKey, CacheEntry)>, StorageError> {
    let pairs: Vec<(String, Box<RawValue>)> =
        serde_json::from_str(text).map_err(|e| StorageError::DataCorruption {
            location: "cache snapshot".to_string(),
            reason: e.to_string(),
        })?;

    let mut decoded = Vec::with_capacity(pairs.len());
    for (raw_key, raw_entry) in pairs {
        let key = match raw_key.parse::<ConfigKey>() {
            Ok(key) => key,
            Err(e) => {
                warn!("skip snapshot entry with invalid key: {}", e);
                continue;
            }
        };
        match serde_json::from_str::<SnapshotEntry>(raw_entry.get()) {
            Ok(entry) => decoded.push((key, CacheEntry::with_stale_at(Arc::new(entry.data), entry.stale_at))),
            Err(e) => warn!(%key, "skip malformed snapshot entry: {}", e),
        }
    }
    Ok(decoded)
}
