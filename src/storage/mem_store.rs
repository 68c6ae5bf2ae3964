use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::DurableStore;
use crate::Result;

/// In-memory item store
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get_item(
        &self,
        name: &str,
    ) -> Result<Option<String>> {
        Ok(self.items.read().get(name).cloned())
    }

    fn set_item(
        &self,
        name: &str,
        value: &str,
    ) -> Result<()> {
        trace!(name, bytes = value.len(), "MemoryStore set_item");
        self.items.write().insert(name.to_string(), value.to_string());
        Ok(())
    }
}
