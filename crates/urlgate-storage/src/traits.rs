//! The persisted key/value store contract.

use crate::StoreResult;

/// A string key/value store with browser local-storage semantics.
///
/// Operations are synchronous so that a caller can read, evict and write
/// without yielding to another task in between.
pub trait KeyValueStore: Send + Sync {
    /// Name of the backend (for logging).
    fn name(&self) -> &str;

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`](crate::StoreError::QuotaExceeded)
    /// when the store is full, or another error if the write fails.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Lists all keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Lists keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Capacity limits for a store, emulating a local-storage quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreQuota {
    /// Maximum number of keys.
    pub max_entries: Option<usize>,

    /// Maximum total size of keys and values, in bytes.
    pub max_bytes: Option<usize>,
}

impl StoreQuota {
    /// No limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit by number of keys.
    #[must_use]
    pub fn entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            max_bytes: None,
        }
    }

    /// Limit by total size.
    #[must_use]
    pub fn bytes(max_bytes: usize) -> Self {
        Self {
            max_entries: None,
            max_bytes: Some(max_bytes),
        }
    }

    /// Whether a store holding `entries` keys totalling `bytes` would exceed
    /// the quota.
    #[must_use]
    pub fn is_exceeded_by(&self, entries: usize, bytes: usize) -> bool {
        self.max_entries.is_some_and(|max| entries > max)
            || self.max_bytes.is_some_and(|max| bytes > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_limits() {
        assert!(!StoreQuota::unlimited().is_exceeded_by(usize::MAX, usize::MAX));
        assert!(!StoreQuota::entries(2).is_exceeded_by(2, 1000));
        assert!(StoreQuota::entries(2).is_exceeded_by(3, 0));
        assert!(StoreQuota::bytes(10).is_exceeded_by(1, 11));
    }
}
