//! File-based key-value storage.
//!
//! Each key is stored as its own file in the store directory
//! (`~/.keepsake/store/` unless configured otherwise). File names are
//! the hex encoding of the key, so any string is a valid key. Atomic writes
//! are achieved via temp file + rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{KeepsakeError, Result};
use crate::storage::KeyValueStore;

/// File-based key-value store.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory holding one file per key.
    dir: PathBuf,
}

impl FileStore {
    /// Create a new file store with a custom directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| KeepsakeError::storage(&dir, e))?;
        }

        Ok(Self { dir })
    }

    /// Directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.tmp", encode_key(key)))
    }
}

/// Hex-encode a key into a file name.
fn encode_key(key: &str) -> String {
    hex::encode(key)
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeepsakeError::storage(&path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let final_path = self.key_path(key);
        let temp_path = self.temp_path(key);

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| KeepsakeError::storage(&temp_path, e))?;
            file.write_all(value.as_bytes())
                .map_err(|e| KeepsakeError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| KeepsakeError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &final_path).map_err(|e| KeepsakeError::storage(&final_path, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(KeepsakeError::storage(&path, e)),
        }

        // Also clean up any temp file left by an interrupted write
        let temp_path = self.temp_path(key);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::test_key_value_store_crud;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::with_dir(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_file_store_crud() {
        let (store, _dir) = create_test_store();
        test_key_value_store_crud(&store);
    }

    #[test]
    fn test_with_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("store");

        assert!(!store_path.exists());

        let store = FileStore::with_dir(&store_path).unwrap();

        assert!(store_path.is_dir());
        assert_eq!(store.dir(), store_path.as_path());
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("ab"), "6162");
        assert_eq!(encode_key(""), "");
        // Path separators never reach the file system
        assert_eq!(encode_key("../x"), "2e2e2f78");
    }

    #[test]
    fn test_unusual_keys() {
        let (store, _dir) = create_test_store();

        for key in ["a/b", "..", "ключ", "with space", "__session_f0b0"] {
            store.set(key, key).unwrap();
            assert_eq!(store.get(key).unwrap().as_deref(), Some(key));
        }
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = FileStore::with_dir(dir.path()).unwrap();
            store.set("token", "abc").unwrap();
        }

        let reopened = FileStore::with_dir(dir.path()).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_temp_file_cleaned_up() {
        let (store, _dir) = create_test_store();

        store.set("k", "v").unwrap();

        assert!(!store.temp_path("k").exists());
        assert!(store.key_path("k").exists());
    }

    #[test]
    fn test_remove_cleans_stale_temp_file() {
        let (store, _dir) = create_test_store();

        fs::write(store.temp_path("k"), "partial").unwrap();
        store.remove("k").unwrap();

        assert!(!store.temp_path("k").exists());
    }

    #[test]
    fn test_get_unreadable_entry_is_error() {
        let (store, _dir) = create_test_store();

        // A directory where a value file is expected cannot be read
        fs::create_dir(store.key_path("k")).unwrap();

        let err = store.get("k").unwrap_err();
        assert!(matches!(err, KeepsakeError::Storage { .. }));
    }
}
