//! File-backed store.
//!
//! All keys live in a single JSON object on disk. Every mutation writes the
//! document to a uniquely named temporary file in the same directory and
//! persists it over the store file with an atomic rename. Readers never see a
//! half-written store, and handles sharing one path never collide on the
//! temporary file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::traits::{KeyValueStore, StoreQuota};
use crate::{StoreError, StoreResult};

/// A persistent store backed by one JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    quota: StoreQuota,
}

impl FileStore {
    /// Opens (or lazily creates) a store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// logged and replaced on the next write, since persisted data is only a
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with_quota(path, StoreQuota::unlimited())
    }

    /// Opens a store that rejects writes beyond `quota`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open_with_quota(path: impl Into<PathBuf>, quota: StoreQuota) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let entries = Self::read_document(&path);
        debug!(path = %path.display(), entries = entries.len(), "File store opened");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
            quota,
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(path: &Path) -> BTreeMap<String, String> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read store file; starting empty");
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Corrupt store file; starting empty");
            BTreeMap::new()
        })
    }

    fn write_document(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let content = serde_json::to_vec(entries)?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::internal("file store lock poisoned"))
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;

        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        let bytes = next.iter().map(|(k, v)| k.len() + v.len()).sum();
        if self.quota.is_exceeded_by(next.len(), bytes) {
            return Err(StoreError::quota_exceeded(key));
        }

        self.write_document(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        if !entries.contains_key(key) {
            return Ok(());
        }

        let mut next = entries.clone();
        next.remove(key);
        self.write_document(&next)?;
        *entries = next;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("urlgate:cache:/a", "{}").unwrap();
        store.set("urlgate:registry", "[]").unwrap();
        store.remove("urlgate:registry").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("urlgate:cache:/a").unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(reopened.get("urlgate:registry").unwrap(), None);
        assert_eq!(reopened.keys().unwrap(), vec!["urlgate:cache:/a"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("nested/dir/store.json")).unwrap();
        assert!(store.keys().unwrap().is_empty());
        store.set("k", "v").unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().unwrap().is_empty());
        store.set("k", "v").unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_handles_sharing_a_path_write_concurrently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = FileStore::open(&path).unwrap();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.set(&format!("w{w}:{i}"), "v")?;
                    }
                    StoreResult::Ok(())
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        // Last writer wins, but the document is always whole.
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.keys().unwrap().len(), 25);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("store.json")]);
    }

    #[test]
    fn test_quota_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open_with_quota(&path, StoreQuota::entries(1)).unwrap();

        store.set("a", "1").unwrap();
        assert!(store.set("b", "2").unwrap_err().is_quota_exceeded());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["a"]);
    }
}
