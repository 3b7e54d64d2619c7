//! Pattern registry.
//!
//! The registry owns the compiled, specificity-sorted pattern list. The list
//! lives in an immutable [`RegistrySnapshot`] behind an [`ArcSwap`], so a
//! refresh replaces it in one atomic store and every reader sees either the
//! old list or the new one in full.
//!
//! ## Load flow
//!
//! 1. A non-forced load on a registry refreshed within `snapshot_ttl` does
//!    nothing ([`LoadOutcome::Current`]).
//! 2. A non-forced load installs a fresh persisted snapshot when one exists
//!    ([`LoadOutcome::FromSnapshot`]).
//! 3. Otherwise the pattern source is fetched under `fetch_timeout`, compiled,
//!    swapped in and persisted ([`LoadOutcome::Refreshed`]).
//! 4. A failed fetch keeps the current list ([`LoadOutcome::Retained`]), falls
//!    back to any persisted snapshot regardless of age
//!    ([`LoadOutcome::FallbackSnapshot`]), or leaves the registry empty
//!    ([`LoadOutcome::Empty`]).
//!
//! Loads are serialized by an async mutex, so at most one fetch of the
//! pattern source is in flight per registry.
//!
//! Every snapshot carries a [fingerprint](RegistrySnapshot::fingerprint) of
//! its records. Cached resolutions are stamped with it, so an entry produced
//! by a different pattern list is never served, including one persisted by a
//! previous process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use urlgate_core::{Pattern, PatternRecord, Resource, compile_all};
use urlgate_storage::{DynStore, KeyValueStore};

use crate::error::FetchError;
use crate::source::PatternSource;

/// Default age after which a registry is considered stale.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on one fetch of the pattern source.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable compiled pattern list.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    patterns: Vec<Pattern>,
    records: Vec<PatternRecord>,
    fingerprint: String,
    version: u64,
    refreshed_at: Option<OffsetDateTime>,
}

impl RegistrySnapshot {
    fn new(records: Vec<PatternRecord>, version: u64, refreshed_at: OffsetDateTime) -> Self {
        Self {
            patterns: compile_all(&records),
            fingerprint: fingerprint(&records),
            records,
            version,
            refreshed_at: Some(refreshed_at),
        }
    }

    /// Compiled patterns, most specific first.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Records this snapshot was compiled from, in registration order.
    #[must_use]
    pub fn records(&self) -> &[PatternRecord] {
        &self.records
    }

    /// SHA-256 of the serialized records, hex encoded. Empty for the initial
    /// registry.
    ///
    /// Equal record lists always produce the same fingerprint, across
    /// processes too.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Incremented on every swap. Zero for the initial empty registry.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the records were obtained from the pattern source.
    #[must_use]
    pub fn refreshed_at(&self) -> Option<OffsetDateTime> {
        self.refreshed_at
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if the snapshot holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Finds the most specific pattern matching a normalized URL.
    #[must_use]
    pub fn find_match(&self, url: &str) -> Option<(&Pattern, HashMap<String, String>)> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.matches(url).map(|params| (pattern, params)))
    }

    /// Resolves a normalized URL into a resource descriptor.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Resource> {
        let (pattern, params) = self.find_match(url)?;
        debug!(url, pattern = pattern.raw(), kind = %pattern.kind(), "Pattern matched");
        Some(Resource::from_metadata(
            url,
            pattern.id(),
            params,
            pattern.metadata(),
        ))
    }

    fn is_fresh(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        self.refreshed_at.is_some_and(|at| now - at < ttl)
    }
}

/// Hashes a record list in registration order.
fn fingerprint(records: &[PatternRecord]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(records).unwrap_or_default());
    hex::encode(hasher.finalize())
}

/// Serialized form of a snapshot in the persisted store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    refreshed_at: OffsetDateTime,
    records: Vec<PatternRecord>,
}

impl PersistedSnapshot {
    fn is_fresh(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        now - self.refreshed_at < ttl
    }
}

// =============================================================================
// Load Outcome
// =============================================================================

/// Which path a [`Registry::load`] call took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched from the pattern source and swapped in.
    Refreshed {
        /// Number of compiled patterns.
        patterns: usize,
        /// Whether the records differ from the list they replace: the
        /// loaded list, or the persisted snapshot when nothing was loaded.
        changed: bool,
    },
    /// Installed an unexpired persisted snapshot without fetching.
    FromSnapshot {
        /// Number of compiled patterns.
        patterns: usize,
        /// Whether the snapshot differs from the list that was loaded.
        changed: bool,
    },
    /// Fetch failed on a never-loaded registry; installed a stale snapshot.
    FallbackSnapshot {
        /// Number of compiled patterns.
        patterns: usize,
    },
    /// The registry was refreshed recently; nothing to do.
    Current,
    /// Fetch failed; the existing list was kept.
    Retained,
    /// Fetch failed and nothing was available to fall back to.
    Empty,
}

impl LoadOutcome {
    /// Returns true if a pattern list is installed after this load.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// Returns true if the installed list differs from the one it replaced.
    #[must_use]
    pub fn replaced_patterns(&self) -> bool {
        matches!(
            self,
            Self::Refreshed { changed: true, .. } | Self::FromSnapshot { changed: true, .. }
        )
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Holds the current pattern list and refreshes it from a [`PatternSource`].
pub struct Registry {
    current: ArcSwap<RegistrySnapshot>,
    source: Arc<dyn PatternSource>,
    store: DynStore,
    snapshot_key: String,
    snapshot_ttl: Duration,
    fetch_timeout: Duration,
    refresh_lock: Mutex<()>,
    loaded: AtomicBool,
}

impl Registry {
    /// Creates an empty registry. Nothing is fetched until [`Registry::load`].
    #[must_use]
    pub fn new(source: Arc<dyn PatternSource>, store: DynStore, key_prefix: &str) -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            source,
            store,
            snapshot_key: format!("{key_prefix}registry"),
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Sets the age after which the registry and persisted snapshot are stale.
    #[must_use]
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Sets the bound on one fetch of the pattern source.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// The current snapshot. Holding it pins that list across a refresh.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Version of the current snapshot.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Returns true once any pattern list has been installed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Key of the persisted snapshot.
    #[must_use]
    pub fn snapshot_key(&self) -> &str {
        &self.snapshot_key
    }

    /// Loads or refreshes the pattern list.
    ///
    /// Never fails: fetch and storage errors are logged and reported through
    /// the returned [`LoadOutcome`].
    pub async fn load(&self, force_refresh: bool) -> LoadOutcome {
        let _guard = self.refresh_lock.lock().await;
        let now = OffsetDateTime::now_utc();
        let was_loaded = self.is_loaded();

        if !force_refresh && was_loaded && self.current.load().is_fresh(self.snapshot_ttl, now) {
            debug!(version = self.version(), "Registry is current");
            return LoadOutcome::Current;
        }

        let persisted = match self.read_persisted() {
            Some(persisted) if !force_refresh && persisted.is_fresh(self.snapshot_ttl, now) => {
                let previous = self.current.load().fingerprint.clone();
                let patterns = self.install(persisted.records, persisted.refreshed_at);
                let changed = was_loaded && previous != self.current.load().fingerprint;
                info!(patterns, changed, "Registry loaded from persisted snapshot");
                return LoadOutcome::FromSnapshot { patterns, changed };
            }
            other => other,
        };

        match self.fetch().await {
            Ok(records) => {
                let previous = if was_loaded {
                    Some(self.current.load().fingerprint.clone())
                } else {
                    persisted.as_ref().map(|p| fingerprint(&p.records))
                };
                let refreshed_at = OffsetDateTime::now_utc();
                self.persist(&records, refreshed_at);
                let patterns = self.install(records, refreshed_at);
                let changed = previous.is_some_and(|fp| fp != self.current.load().fingerprint);
                info!(
                    source = self.source.name(),
                    patterns,
                    changed,
                    version = self.version(),
                    "Registry refreshed"
                );
                LoadOutcome::Refreshed { patterns, changed }
            }
            Err(e) => {
                if was_loaded {
                    warn!(
                        source = self.source.name(),
                        error = %e,
                        version = self.version(),
                        "Pattern source fetch failed; keeping current registry"
                    );
                    return LoadOutcome::Retained;
                }

                match persisted {
                    Some(persisted) => {
                        let patterns = self.install(persisted.records, persisted.refreshed_at);
                        warn!(
                            source = self.source.name(),
                            error = %e,
                            patterns,
                            "Pattern source fetch failed; using persisted snapshot"
                        );
                        LoadOutcome::FallbackSnapshot { patterns }
                    }
                    None => {
                        warn!(
                            source = self.source.name(),
                            error = %e,
                            "Pattern source fetch failed and no snapshot is available"
                        );
                        LoadOutcome::Empty
                    }
                }
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<PatternRecord>, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after: self.fetch_timeout,
            }),
        }
    }

    /// Compiles `records` and swaps them in. Returns the pattern count.
    fn install(&self, records: Vec<PatternRecord>, refreshed_at: OffsetDateTime) -> usize {
        let version = self.current.load().version + 1;
        let snapshot = RegistrySnapshot::new(records, version, refreshed_at);
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));
        self.loaded.store(true, Ordering::Release);
        count
    }

    fn read_persisted(&self) -> Option<PersistedSnapshot> {
        let raw = match self.store.get(&self.snapshot_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.snapshot_key, error = %e, "Failed to read registry snapshot");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(key = %self.snapshot_key, error = %e, "Discarding corrupt registry snapshot");
                if let Err(e) = self.store.remove(&self.snapshot_key) {
                    warn!(key = %self.snapshot_key, error = %e, "Failed to remove registry snapshot");
                }
                None
            }
        }
    }

    fn persist(&self, records: &[PatternRecord], refreshed_at: OffsetDateTime) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Borrowed<'a> {
            #[serde(with = "time::serde::rfc3339")]
            refreshed_at: OffsetDateTime,
            records: &'a [PatternRecord],
        }

        let encoded = match serde_json::to_string(&Borrowed {
            refreshed_at,
            records,
        }) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode registry snapshot");
                return;
            }
        };

        if let Err(e) = self.store.set(&self.snapshot_key, &encoded) {
            warn!(key = %self.snapshot_key, error = %e, "Failed to persist registry snapshot");
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("Registry")
            .field("source", &self.source.name())
            .field("store", &self.store.name())
            .field("version", &snapshot.version)
            .field("patterns", &snapshot.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
