//! Durable key-value storage backing the cache mirror.
//!
//! The cache writes exactly two items through this seam (the snapshot and its
//! format version); nothing else in the crate touches durable storage.
mod mem_store;
mod sled_store;

pub use mem_store::*;
pub use sled_store::*;


use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::Result;
use crate::StorageBackend;
use crate::StorageConfig;

/// String-valued item store, modelled on browser-style local storage.
#[cfg_attr(test, automock)]
pub trait DurableStore: Send + Sync + 'static {
    fn get_item(
        &self,
        name: &str,
    ) -> Result<Option<String>>;

    fn set_item(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()>;
}

/// Opens the store selected by `config`
pub fn open_durable_store(config: &StorageConfig) -> Result<Arc<dyn DurableStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sled => Ok(Arc::new(SledStore::open(&config.db_path)?)),
    }
}

pub(crate) fn init_sled_items_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_items_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref();

    sled::Config::default()
        .path(path)
        .cache_capacity(4 * 1024 * 1024) //4MB
        .flush_every_ms(Some(3))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            std::io::Error::other(e)
        })
}
