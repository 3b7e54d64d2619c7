//! In-memory store backend.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::traits::{KeyValueStore, StoreQuota};
use crate::{StoreError, StoreResult};

/// A volatile store held in process memory, with an optional quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota: StoreQuota,
}

impl MemoryStore {
    /// Creates an unlimited store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `quota`.
    #[must_use]
    pub fn with_quota(quota: StoreQuota) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota,
        }
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_of(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))?;

        let previous = entries.get(key).map_or(0, |v| key.len() + v.len());
        let count = entries.len() + usize::from(!entries.contains_key(key));
        let bytes = Self::size_of(&entries) - previous + key.len() + value.len();
        if self.quota.is_exceeded_by(count, bytes) {
            return Err(StoreError::quota_exceeded(key));
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::internal("memory store lock poisoned"))?;
        Ok(entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        store.set("app:cache:/a", "x").unwrap();
        store.set("app:cache:/b", "y").unwrap();
        store.set("other", "z").unwrap();

        let mut keys = store.keys_with_prefix("app:cache:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["app:cache:/a", "app:cache:/b"]);
        assert_eq!(store.keys().unwrap().len(), 3);
    }

    #[test]
    fn test_entry_quota_rejects_new_keys() {
        let store = MemoryStore::with_quota(StoreQuota::entries(2));
        store.set("a", "1").unwrap();
        store.set("b", "1").unwrap();

        let err = store.set("c", "1").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(store.get("c").unwrap(), None);

        // Overwriting an existing key does not add an entry.
        store.set("a", "2").unwrap();

        store.remove("b").unwrap();
        store.set("c", "1").unwrap();
    }

    #[test]
    fn test_byte_quota() {
        let store = MemoryStore::with_quota(StoreQuota::bytes(8));
        store.set("ab", "cd").unwrap();
        store.set("ef", "gh").unwrap();
        assert!(store.set("ij", "k").unwrap_err().is_quota_exceeded());

        // Replacing a value only counts the difference.
        store.set("ab", "").unwrap();
        store.set("ij", "").unwrap();
    }
}
