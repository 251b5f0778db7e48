//! In-memory key-value storage.
//!
//! Thread-safe `KeyValueStore` used as a test double and for short-lived
//! sessions that need no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::storage::KeyValueStore;

/// In-memory key-value store.
///
/// Entries are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap();
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key);
        Ok(())
    }
}
