use std::path::Path;

use tracing::trace;

use super::init_sled_items_db;
use crate::constants::SLED_ITEMS_TREE;
use crate::DurableStore;
use crate::Result;
use crate::StorageError;

/// Item store persisted in an embedded sled database
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        let db = init_sled_items_db(path).map_err(StorageError::IoError)?;
        Self::with_db(db)
    }

    pub fn with_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(SLED_ITEMS_TREE).map_err(StorageError::DbError)?;
        Ok(Self { db, tree })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(StorageError::DbError)?;
        Ok(())
    }
}

impl DurableStore for SledStore {
    fn get_item(
        &self,
        name: &str,
    ) -> Result<Option<String>> {
        let Some(bytes) = self.tree.get(name).map_err(StorageError::DbError)? else {
            return Ok(None);
        };
        let value = String::from_utf8(bytes.to_vec()).map_err(|e| StorageError::DataCorruption {
            location: format!("{SLED_ITEMS_TREE}/{name}"),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn set_item(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        trace!(name, bytes = value.len(), "SledStore set_item");
        self.tree.insert(name, value.as_bytes()).map_err(StorageError::DbError)?;
        self.tree.flush().map_err(StorageError::DbError)?;
        Ok(())
    }
}
