use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// String key/value storage with `localStorage` semantics
pub trait LocalStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl dyn LocalStore + '_ {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_item(key)? {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse stored value: {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for: {}", key))?;
        self.set_item(key, &raw)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory store, for tests and hosts without a disk
#[derive(Default)]
pub struct MemoryLocalStore {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// All items in one JSON object file, rewritten on every change.
///
/// The contents are disposable: an unreadable file is logged and replaced.
pub struct FileLocalStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let items = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read local storage: {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(items) => items,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Local storage unreadable, starting empty");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write through a temp file so a torn write never replaces the last good copy
    fn flush(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(items)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write local storage: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace local storage: {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = items.len(), "Local storage written");
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = lock(&self.items);
        let mut next = items.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *items = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = lock(&self.items);
        if !items.contains_key(key) {
            return Ok(());
        }
        let mut next = items.clone();
        next.remove(key);
        self.flush(&next)?;
        *items = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_helpers() {
        let store = MemoryLocalStore::new();
        let store: &dyn LocalStore = &store;
        store.set_json("cachedStores", &vec![1, 2, 3]).expect("save");
        let loaded: Option<Vec<i32>> = store.get_json("cachedStores").expect("load");
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        store.set_item("broken", "{not json").expect("save raw");
        assert!(store.get_json::<Vec<i32>>("broken").is_err());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let path = std::env::temp_dir()
            .join(format!("shoecache-local-{}", std::process::id()))
            .join("local_storage.json");
        let _ = std::fs::remove_file(&path);

        let store = FileLocalStore::open(&path).expect("open");
        store.set_item("lastStoreVisit", "1700000000000").expect("set");
        store.set_item("IdTienda", "3").expect("set");
        store.remove_item("IdTienda").expect("remove");
        drop(store);

        let reopened = FileLocalStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get_item("lastStoreVisit").expect("get").as_deref(),
            Some("1700000000000")
        );
        assert_eq!(reopened.get_item("IdTienda").expect("get"), None);

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shoecache-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn test_file_store_recovers_from_truncated_file() {
        let dir = scratch_dir("local-truncated");
        let path = dir.join("local_storage.json");
        std::fs::write(&path, r#"{"cachedStores": "[{\"ID_Tien"#).expect("write");

        let store = FileLocalStore::open(&path).expect("unreadable file is not fatal");
        assert_eq!(store.get_item("cachedStores").expect("get"), None);
        store.set_item("lastStoreVisit", "1").expect("set");

        let reopened = FileLocalStore::open(&path).expect("reopen");
        assert_eq!(reopened.get_item("lastStoreVisit").expect("get").as_deref(), Some("1"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let dir = scratch_dir("local-failed-write");
        let path = dir.join("local_storage.json");
        let store = FileLocalStore::open(&path).expect("open");
        store.set_item("checkoutCart", "old").expect("set");

        // A directory where the temp file goes makes the write fail
        std::fs::create_dir_all(path.with_extension("tmp")).expect("block temp file");
        assert!(store.set_item("checkoutCart", "new").is_err());
        assert!(store.remove_item("checkoutCart").is_err());
        assert_eq!(store.get_item("checkoutCart").expect("get").as_deref(), Some("old"));

        let reopened = FileLocalStore::open(&path).expect("reopen");
        assert_eq!(reopened.get_item("checkoutCart").expect("get").as_deref(), Some("old"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
