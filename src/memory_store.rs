use std::{sync::{Arc, RwLock}, collections::HashMap};

use crate::store::KeyByteValueStore;

use anyhow::anyhow;

/// A `KeyByteValueStore` implementation backed by a HashMap. Clones share
/// the same entries.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    store: Arc<RwLock<HashMap<String,Vec<u8>>>>
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyByteValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, anyhow::Error> {
        let store = self.store.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(store.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), anyhow::Error> {
        self.store.write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), anyhow::Error> {
        self.store.write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .remove(key);
        Ok(())
    }

    fn set_if(&mut self, key: &str, expected: Option<&[u8]>, value: Vec<u8>) -> Result<bool, anyhow::Error> {
        let mut store = self.store.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        if store.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        store.insert(key.to_string(), value);
        Ok(true)
    }
}
