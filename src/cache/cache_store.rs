use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::snapshot::decode_snapshot;
use super::snapshot::encode_snapshot;
use super::CacheEntry;
use super::CacheState;
use crate::constants::CACHE_SNAPSHOT_KEY;
use crate::constants::CACHE_SNAPSHOT_VERSION;
use crate::constants::CACHE_VERSION_KEY;
use crate::metrics::PERSISTENCE_FAILURES;
use crate::utils::time::now_millis;
use crate::CacheConfig;
use crate::ConfigKey;
use crate::DurableStore;
use crate::Payload;
use crate::Result;
use crate::StorageError;

/// In-memory payload cache mirrored to a [`DurableStore`].
///
/// `put` is the only writer of both the map and the durable snapshot. The
/// snapshot is written while the map's write lock is held, so the order in
/// which writes land on disk matches the order they land in memory.
///
/// A durable failure switches the store to memory-only mode for the rest of
/// its lifetime; it never fails a `put`.
pub struct CacheStore {
    entries: RwLock<HashMap<ConfigKey, Arc<CacheEntry>>>,
    durable: Option<Arc<dyn DurableStore>>,
    durable_healthy: AtomicBool,
    default_ttl: Duration,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.read().len())
            .field("persisting", &self.is_persisting())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl CacheStore {
    /// `durable` is ignored when `config.persist` is false
    pub fn new(
        config: &CacheConfig,
        durable: Option<Arc<dyn DurableStore>>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            durable: durable.filter(|_| config.persist),
            durable_healthy: AtomicBool::new(true),
            default_ttl: config.default_ttl(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(
        &self,
        key: &ConfigKey,
    ) -> Option<Arc<CacheEntry>> {
        self.entries.read().get(key).cloned()
    }

    pub fn state(
        &self,
        key: &ConfigKey,
    ) -> CacheState {
        CacheState::of(self.get(key).as_deref())
    }

    /// Replaces the entry for `key` and mirrors the whole cache to durable
    /// storage before returning. `ttl` falls back to the default TTL.
    pub fn put(
        &self,
        key: &ConfigKey,
        payload: Arc<Payload>,
        ttl: Option<Duration>,
    ) -> Arc<CacheEntry> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = Arc::new(CacheEntry::new(payload, ttl));

        let mut entries = self.entries.write();
        entries.insert(key.clone(), entry.clone());
        trace!(%key, stale_at = entry.stale_at_millis(), "cache entry replaced");
        self.persist(&entries);

        entry
    }

    /// Seeds memory from the durable snapshot, dropping entries that are
    /// already stale. Entries already in memory are kept. Returns the number
    /// of entries seeded. Unreadable snapshots are logged and ignored.
    pub fn load_from_durable_storage(&self) -> usize {
        let Some(durable) = self.durable.as_ref() else {
            return 0;
        };

        let loaded = match read_snapshot(durable.as_ref()) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                debug!("no durable cache snapshot found");
                return 0;
            }
            Err(e @ crate::Error::Storage(StorageError::DataCorruption { .. }))
            | Err(e @ crate::Error::Storage(StorageError::VersionMismatch { .. })) => {
                warn!("ignoring durable cache snapshot: {}", e);
                return 0;
            }
            Err(e) => {
                self.mark_durable_failed(&e);
                return 0;
            }
        };

        let now = now_millis();
        let mut entries = self.entries.write();
        let mut seeded = 0;
        for (key, entry) in loaded {
            if entry.is_stale_at(now) {
                trace!(%key, "dropping expired snapshot entry");
                continue;
            }
            if entries.contains_key(&key) {
                continue;
            }
            entries.insert(key, Arc::new(entry));
            seeded += 1;
        }
        info!(seeded, "cache seeded from durable storage");
        seeded
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether writes are still mirrored to durable storage
    pub fn is_persisting(&self) -> bool {
        self.durable.is_some() && self.durable_healthy.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn entries_for_test(&self) -> parking_lot::RwLockWriteGuard<'_, HashMap<ConfigKey, Arc<CacheEntry>>> {
        self.entries.write()
    }

    fn persist(
        &self,
        entries: &HashMap<ConfigKey, Arc<CacheEntry>>,
    ) {
        let Some(durable) = self.durable.as_ref() else {
            return;
        };
        if !self.durable_healthy.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = write_snapshot(durable.as_ref(), entries) {
            self.mark_durable_failed(&e);
        }
    }

    fn mark_durable_failed(
        &self,
        e: &crate::Error,
    ) {
        PERSISTENCE_FAILURES.inc();
        if self.durable_healthy.swap(false, Ordering::AcqRel) {
            warn!("durable cache storage failed, continuing in memory only: {}", e);
        }
    }
}

fn write_snapshot(
    durable: &dyn DurableStore,
    entries: &HashMap<ConfigKey, Arc<CacheEntry>>,
) -> Result<()> {
    let snapshot = encode_snapshot(entries)?;
    durable.set_item(CACHE_SNAPSHOT_KEY, &snapshot)?;
    durable.set_item(CACHE_VERSION_KEY, CACHE_SNAPSHOT_VERSION)?;
    Ok(())
}

fn read_snapshot(durable: &dyn DurableStore) -> Result<Option<Vec<(ConfigKey, CacheEntry)>>> {
    if let Some(version) = durable.get_item(CACHE_VERSION_KEY)? {
        if version != CACHE_SNAPSHOT_VERSION {
            return Err(StorageError::VersionMismatch {
                found: version,
                expected: CACHE_SNAPSHOT_VERSION.to_string(),
            }
            .into());
        }
    }

    match durable.get_item(CACHE_SNAPSHOT_KEY)? {
        Some(text) => Ok(Some(decode_snapshot(&text)?)),
        None => Ok(None),
    }
}
