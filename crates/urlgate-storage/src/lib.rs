//! # urlgate-storage
//!
//! Persisted key/value store used by urlgate for the resolution cache and the
//! pattern registry snapshot.
//!
//! The [`KeyValueStore`] trait mirrors browser local storage: string keys,
//! string values, synchronous calls, and a quota that rejects writes with
//! [`StoreError::QuotaExceeded`]. Callers namespace their keys with a fixed
//! prefix so unrelated application state can share the same store.
//!
//! ## Backends
//!
//! - [`MemoryStore`] - volatile, optional quota (useful for tests)
//! - [`FileStore`] - a single JSON document on disk
//!
//! ## Example
//!
//! ```
//! use urlgate_storage::{KeyValueStore, MemoryStore, StoreQuota};
//!
//! let store = MemoryStore::with_quota(StoreQuota::entries(1));
//! store.set("urlgate:a", "1").unwrap();
//! assert!(store.set("urlgate:b", "2").unwrap_err().is_quota_exceeded());
//! ```

mod error;
mod file;
mod memory;
mod traits;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{KeyValueStore, StoreQuota};

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store trait object.
pub type DynStore = std::sync::Arc<dyn KeyValueStore>;
