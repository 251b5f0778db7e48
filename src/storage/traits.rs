//! Key-value storage trait for keepsake.
//!
//! This module defines the `KeyValueStore` trait that session state is
//! persisted through.

use std::sync::Arc;

use crate::error::Result;

/// Trait for durable string key-value storage backends.
///
/// Implementations map string keys to string values, survive process
/// restarts (except for in-memory test doubles) and never expire entries on
/// their own.
pub trait KeyValueStore: Send + Sync {
    /// Retrieve the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`.
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    fn remove(&self, key: &str) -> Result<()>;

    /// Check if a key is present.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Blanket implementation of KeyValueStore for Arc-wrapped stores.
///
/// Lets tests keep a handle on the backend while a `SessionStore` owns it.
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
