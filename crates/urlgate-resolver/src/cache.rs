//! Resolution cache.
//!
//! A two-tier cache keyed by normalized URL: a concurrent in-memory map in
//! front of the persisted key/value store. The persisted copy is a fallback
//! for restarts; memory is always at least as fresh.
//!
//! Every entry records the fingerprint of the registry snapshot that produced
//! it. A lookup names the fingerprint it expects, and an entry carrying any
//! other is treated like an expired one.
//!
//! The persisted tier has a soft capacity. A write that would exceed it, or
//! that the store rejects with a quota error, evicts the entries closest to
//! expiry and retries once. A final failure leaves the entry in memory only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use urlgate_core::Resource;
use urlgate_storage::{DynStore, KeyValueStore, StoreError, StoreResult};

/// Default soft capacity of the persisted tier.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default share of persisted entries evicted when the tier is full.
pub const DEFAULT_EVICTION_FRACTION: f64 = 0.25;

/// A cached resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The resolved resource.
    pub resource: Resource,

    /// Instant after which the entry must not be served.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Fingerprint of the registry snapshot the resource was resolved from.
    #[serde(default)]
    pub fingerprint: String,
}

impl CacheEntry {
    /// Creates an entry expiring `ttl` from now.
    #[must_use]
    pub fn new(resource: Resource, ttl: Duration, fingerprint: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or(now + time::Duration::days(365 * 100));
        Self {
            resource,
            expires_at,
            fingerprint: fingerprint.into(),
        }
    }

    /// Returns true if the entry may no longer be served at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the entry is unexpired and was produced by the
    /// registry snapshot with `fingerprint`.
    #[must_use]
    pub fn is_servable(&self, now: OffsetDateTime, fingerprint: &str) -> bool {
        !self.is_expired_at(now) && self.fingerprint == fingerprint
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from memory.
    pub memory_hits: u64,
    /// Lookups served from the persisted tier (and promoted).
    pub persisted_hits: u64,
    /// Lookups that found nothing servable.
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
    /// Persisted entries removed to make room.
    pub evictions: u64,
    /// Writes that could not be persisted.
    pub persist_failures: u64,
    /// Expired entries removed by sweeps.
    pub swept: u64,
    /// Entries currently in memory.
    pub memory_entries: usize,
}

impl CacheStats {
    /// Total hits across both tiers.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.persisted_hits
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    persisted_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    persist_failures: AtomicU64,
    swept: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

// =============================================================================
// Resolution Cache
// =============================================================================

/// Maps normalized URLs to recent resolutions.
pub struct ResolutionCache {
    memory: DashMap<String, CacheEntry>,
    store: DynStore,
    key_prefix: String,
    capacity: usize,
    eviction_fraction: f64,
    persist_lock: std::sync::Mutex<()>,
    counters: Counters,
}

impl ResolutionCache {
    /// Creates a cache persisting under `{key_prefix}cache:`.
    #[must_use]
    pub fn new(store: DynStore, key_prefix: &str) -> Self {
        Self {
            memory: DashMap::new(),
            store,
            key_prefix: format!("{key_prefix}cache:"),
            capacity: DEFAULT_CAPACITY,
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
            persist_lock: std::sync::Mutex::new(()),
            counters: Counters::default(),
        }
    }

    /// Sets the soft capacity of the persisted tier.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the share of persisted entries evicted when the tier is full.
    #[must_use]
    pub fn with_eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Persisted key for a URL.
    #[must_use]
    pub fn key_for(&self, url: &str) -> String {
        format!("{}{url}", self.key_prefix)
    }

    /// Returns the cached resource for `url` if it has not expired and was
    /// resolved by the registry snapshot with `fingerprint`.
    ///
    /// Memory is checked first. A servable persisted entry is promoted into
    /// memory; an expired, mismatched or unreadable one is deleted.
    pub fn get(&self, url: &str, fingerprint: &str) -> Option<Resource> {
        let now = OffsetDateTime::now_utc();

        if let Some(entry) = self.memory.get(url)
            && entry.is_servable(now, fingerprint)
        {
            bump(&self.counters.memory_hits, 1);
            debug!(url, tier = "memory", "Cache hit");
            return Some(entry.resource.clone());
        }
        self.memory
            .remove_if(url, |_, entry| !entry.is_servable(now, fingerprint));

        let key = self.key_for(url);
        if let Some(entry) = self.read_persisted(&key) {
            if entry.is_servable(now, fingerprint) {
                let resource = entry.resource.clone();
                self.memory.insert(url.to_string(), entry);
                bump(&self.counters.persisted_hits, 1);
                debug!(url, tier = "persisted", "Cache hit");
                return Some(resource);
            }
            self.remove_unservable(&key, now, fingerprint);
        }

        bump(&self.counters.misses, 1);
        debug!(url, "Cache miss");
        None
    }

    /// Caches `resource` for `url` with the given TTL, stamped with the
    /// fingerprint of the snapshot that resolved it.
    ///
    /// The memory write always succeeds. Persistence failures are logged and
    /// counted.
    pub fn set(&self, url: &str, resource: Resource, ttl: Duration, fingerprint: &str) {
        let entry = CacheEntry::new(resource, ttl, fingerprint);
        let encoded = serde_json::to_string(&entry);
        self.memory.insert(url.to_string(), entry);
        bump(&self.counters.writes, 1);

        match encoded {
            Ok(encoded) => self.persist(url, &encoded),
            Err(e) => {
                bump(&self.counters.persist_failures, 1);
                warn!(url, error = %e, "Failed to encode cache entry");
            }
        }
    }

    /// Removes every expired entry from both tiers. Returns how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = OffsetDateTime::now_utc();

        let before = self.memory.len();
        self.memory.retain(|_, entry| !entry.is_expired_at(now));
        let mut removed = before.saturating_sub(self.memory.len());

        let _guard = self.lock_persist();
        for key in self.persisted_keys() {
            let expired = self
                .read_persisted(&key)
                .is_none_or(|entry| entry.is_expired_at(now));
            if expired {
                self.remove_persisted(&key);
                removed += 1;
            }
        }

        bump(&self.counters.swept, removed as u64);
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Drops every entry from both tiers.
    pub fn clear(&self) {
        self.memory.clear();
        let _guard = self.lock_persist();
        let keys = self.persisted_keys();
        let count = keys.len();
        for key in keys {
            self.remove_persisted(&key);
        }
        info!(persisted = count, "Resolution cache cleared");
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            persisted_hits: c.persisted_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
            swept: c.swept.load(Ordering::Relaxed),
            memory_entries: self.memory.len(),
        }
    }

    /// Number of entries in memory.
    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Number of entries in the persisted tier.
    #[must_use]
    pub fn persisted_len(&self) -> usize {
        self.persisted_keys().len()
    }

    /// Starts a task that sweeps the cache every `interval`.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweepHandle {
        let cache = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "Cache sweeper started");
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep();
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweepHandle {
            handle,
            shutdown: Some(shutdown_tx),
        }
    }

    // -------------------------------------------------------------------------
    // Persisted tier
    // -------------------------------------------------------------------------

    fn lock_persist(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.persist_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, url: &str, encoded: &str) {
        let key = self.key_for(url);
        let _guard = self.lock_persist();

        let result = self.write_within_capacity(&key, encoded);
        let result = match result {
            Err(e) if e.is_quota_exceeded() => {
                self.evict_oldest();
                self.write_within_capacity(&key, encoded)
            }
            other => other,
        };

        if let Err(e) = result {
            bump(&self.counters.persist_failures, 1);
            warn!(url, error = %e, "Resolution not persisted; kept in memory only");
        }
    }

    /// Writes one entry, treating the soft capacity like a store quota.
    fn write_within_capacity(&self, key: &str, encoded: &str) -> StoreResult<()> {
        let existing = self.persisted_keys();
        let is_new = !existing.iter().any(|k| k == key);
        if is_new && existing.len() >= self.capacity {
            return Err(StoreError::quota_exceeded(key));
        }
        self.store.set(key, encoded)
    }

    /// Deletes the persisted entries closest to expiry.
    ///
    /// Removes `max(1, floor(n * eviction_fraction))` entries. Unreadable
    /// entries sort first.
    fn evict_oldest(&self) {
        let mut entries: Vec<(Option<OffsetDateTime>, String)> = self
            .persisted_keys()
            .into_iter()
            .map(|key| (self.read_persisted(&key).map(|e| e.expires_at), key))
            .collect();
        if entries.is_empty() {
            return;
        }

        entries.sort();
        let count = ((entries.len() as f64 * self.eviction_fraction).floor() as usize).max(1);
        for (_, key) in entries.iter().take(count) {
            self.remove_persisted(key);
        }

        bump(&self.counters.evictions, count as u64);
        info!(evicted = count, remaining = entries.len() - count, "Evicted oldest cache entries");
    }

    /// Deletes the persisted entry at `key` unless a concurrent writer has
    /// replaced it with a servable one. Returns true if it was deleted.
    fn remove_unservable(&self, key: &str, now: OffsetDateTime, fingerprint: &str) -> bool {
        let _guard = self.lock_persist();
        let unservable = self
            .read_persisted(key)
            .is_none_or(|entry| !entry.is_servable(now, fingerprint));
        if unservable {
            self.remove_persisted(key);
        }
        unservable
    }

    fn persisted_keys(&self) -> Vec<String> {
        self.store
            .keys_with_prefix(&self.key_prefix)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list persisted cache entries");
                Vec::new()
            })
    }

    fn read_persisted(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(key, error = %e, "Unreadable persisted cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted cache entry");
                None
            }
        }
    }

    fn remove_persisted(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Failed to remove persisted cache entry");
        }
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("store", &self.store.name())
            .field("key_prefix", &self.key_prefix)
            .field("capacity", &self.capacity)
            .field("memory_entries", &self.memory.len())
            .finish()
    }
}

// =============================================================================
// Sweeper
// =============================================================================

/// Handle to a running sweeper task. Dropping it also stops the task.
#[derive(Debug)]
pub struct SweepHandle {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SweepHandle {
    /// Signals the sweeper to stop and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.handle).await;
    }

    /// Returns true if the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
