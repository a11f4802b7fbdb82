//! Namespaced string key-value storage, the persistence seam shared by the
//! response cache and the view state.
//!
//! Callers treat every failure here as recoverable: a failed read is a miss,
//! a failed write is logged and dropped.

use std::{fs, io, path::PathBuf};
#[cfg(test)]
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result as AnyResult, anyhow};
use dirs_next::data_dir;
use thiserror::Error;

pub const NAMESPACE: &str = "anitrack";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[cfg(test)]
    #[error("in-memory storage lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Prefixes `key` with the crate namespace, e.g. `anitrack:favorites`.
pub fn namespaced(key: &str) -> String {
    format!("{NAMESPACE}:{key}")
}

/// One file per key under a base directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open_at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Keys are percent-encoded into file names so distinct keys never share
    /// a file (`search-a b` and `search-a_b` stay apart).
    pub fn path_for(&self, key: &str) -> PathBuf {
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        let name = if encoded.is_empty() || encoded.starts_with('.') {
            format!("_{encoded}")
        } else {
            encoded
        };
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|source| StorageError::Io { path, source })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.remove(key);
        Ok(())
    }
}

pub fn default_storage_dir() -> AnyResult<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join(NAMESPACE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn file_storage_round_trip_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open_at(dir.path().join("nested"));

        assert_eq!(storage.get_item("anitrack:favorites").unwrap(), None);
        storage.set_item("anitrack:favorites", "[1,2]").unwrap();
        assert_eq!(
            storage.get_item("anitrack:favorites").unwrap().as_deref(),
            Some("[1,2]")
        );

        storage.remove_item("anitrack:favorites").unwrap();
        assert_eq!(storage.get_item("anitrack:favorites").unwrap(), None);
        // removing twice is fine
        storage.remove_item("anitrack:favorites").unwrap();
    }

    #[test]
    fn similar_keys_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open_at(dir.path());
        assert_ne!(storage.path_for("search-a b"), storage.path_for("search-a_b"));
        assert_ne!(storage.path_for("search-a/b"), storage.path_for("search-a_b"));

        storage.set_item("search-a b", "spaced").unwrap();
        storage.set_item("search-a_b", "underscored").unwrap();
        assert_eq!(
            storage.get_item("search-a b").unwrap().as_deref(),
            Some("spaced")
        );
    }

    #[test]
    fn path_stays_inside_base_dir() {
        let storage = FileStorage::open_at("/tmp/anitrack-test");
        let path = storage.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/tmp/anitrack-test")));
    }

    #[test]
    fn memory_storage_shares_state_between_clones() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.set_item("k", "v").unwrap();
        assert_eq!(other.get_item("k").unwrap().as_deref(), Some("v"));
        other.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
    }

    #[test]
    fn namespaced_keys_carry_prefix() {
        assert_eq!(namespaced("preferences"), "anitrack:preferences");
    }
}
