//! URL resolution.
//!
//! [`Resolver::resolve`] normalizes a URL, pins one registry snapshot,
//! consults the cache for entries that snapshot produced and falls back to
//! walking its patterns. Concurrent calls for the same URL are not
//! deduplicated here.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use urlgate_core::{Resource, normalize_url};

use crate::cache::ResolutionCache;
use crate::registry::{LoadOutcome, Registry};

/// Default TTL for resolutions whose pattern names none.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Resolves URLs against a registry through a cache.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    cache: Arc<ResolutionCache>,
    default_ttl: Duration,
}

impl Resolver {
    /// Creates a resolver over a shared registry and cache.
    #[must_use]
    pub fn new(registry: Arc<Registry>, cache: Arc<ResolutionCache>) -> Self {
        Self {
            registry,
            cache,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Sets the TTL used when a pattern's cache policy names none.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The registry this resolver reads.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The cache this resolver writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Loads or refreshes the registry, clearing the cache when the installed
    /// pattern list differs from the one it replaced.
    pub async fn load(&self, force_refresh: bool) -> LoadOutcome {
        let outcome = self.registry.load(force_refresh).await;
        if outcome.replaced_patterns() {
            info!(?outcome, "Pattern list changed; clearing resolution cache");
            self.cache.clear();
        }
        outcome
    }

    /// Resolves `url` to a resource, or `None` when no pattern matches.
    ///
    /// A registry that was never loaded is loaded first. Cached entries are
    /// served only if the current snapshot produced them. A match is cached
    /// unless its pattern opts out, or a refresh swapped the registry while
    /// this call was matching.
    pub async fn resolve(&self, url: &str) -> Option<Resource> {
        let url = normalize_url(url);

        if !self.registry.is_loaded() {
            self.load(false).await;
        }

        let snapshot = self.registry.snapshot();
        if let Some(resource) = self.cache.get(&url, snapshot.fingerprint()) {
            return Some(resource);
        }

        let Some(resource) = snapshot.resolve(&url) else {
            debug!(url = %url, patterns = snapshot.len(), "No pattern matched");
            return None;
        };

        let policy = &resource.cache_policy;
        if policy.no_store {
            debug!(url = %url, pattern = %resource.pattern_id, "Pattern disables caching");
        } else if self.registry.version() == snapshot.version() {
            let ttl = policy.effective_ttl(self.default_ttl);
            self.cache
                .set(&url, resource.clone(), ttl, snapshot.fingerprint());
        }

        Some(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticPatternSource;
    use urlgate_core::{CachePolicy, PatternRecord};
    use urlgate_storage::{DynStore, MemoryStore};

    fn resolver(records: Vec<PatternRecord>) -> (Resolver, Arc<StaticPatternSource>) {
        let source = Arc::new(StaticPatternSource::new(records));
        let store: DynStore = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new(source.clone(), store.clone(), "test:"));
        let cache = Arc::new(ResolutionCache::new(store, "test:"));
        (Resolver::new(registry, cache), source)
    }

    #[tokio::test]
    async fn test_resolve_loads_lazily_and_normalizes() {
        let (resolver, _) = resolver(vec![PatternRecord::new(
            "/clients/:clientId/:projectId",
            "project",
        )]);
        assert!(!resolver.registry().is_loaded());

        let resource = resolver
            .resolve("https://app.example.com/clients/elpl/merit/?tab=1#top")
            .await
            .unwrap();

        assert!(resolver.registry().is_loaded());
        assert_eq!(resource.url, "/clients/elpl/merit");
        assert_eq!(resource.params.len(), 2);
        assert_eq!(resource.param("clientId"), Some("elpl"));
        assert_eq!(resource.param("projectId"), Some("merit"));
    }

    #[tokio::test]
    async fn test_second_resolve_is_served_from_cache() {
        let (resolver, source) = resolver(vec![PatternRecord::new("/home", "page")]);

        let first = resolver.resolve("/home").await.unwrap();
        // Later source changes are invisible until a refresh.
        source.replace(vec![]);
        let second = resolver.resolve("/home/").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.cache().stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn test_refresh_with_new_records_clears_cache() {
        let (resolver, source) = resolver(vec![PatternRecord::new("/home", "page")]);
        resolver.resolve("/home").await.unwrap();
        assert_eq!(resolver.cache().memory_len(), 1);

        source.replace(vec![PatternRecord::new("/home", "landing")]);
        let outcome = resolver.load(true).await;
        assert!(outcome.replaced_patterns());
        assert_eq!(resolver.cache().memory_len(), 0);
        assert_eq!(resolver.cache().persisted_len(), 0);

        let resource = resolver.resolve("/home").await.unwrap();
        assert_eq!(resource.resource_type, "landing");
    }

    #[tokio::test]
    async fn test_entries_from_another_registry_are_not_served() {
        let (resolver, _) = resolver(vec![PatternRecord::new("/home", "page")]);
        resolver.load(false).await;

        let mut stale = resolver.registry().snapshot().resolve("/home").unwrap();
        stale.resource_type = "stale".to_string();
        resolver
            .cache()
            .set("/home", stale, Duration::from_secs(3600), "other-registry");

        let resource = resolver.resolve("/home").await.unwrap();
        assert_eq!(resource.resource_type, "page");
        assert_eq!(resolver.cache().stats().hits(), 0);
    }

    #[tokio::test]
    async fn test_no_match_is_none_and_not_cached() {
        let (resolver, _) = resolver(vec![PatternRecord::new("/home", "page")]);
        assert!(resolver.resolve("/missing").await.is_none());
        assert_eq!(resolver.cache().memory_len(), 0);
    }

    #[tokio::test]
    async fn test_no_store_policy_skips_cache() {
        let (resolver, _) = resolver(vec![
            PatternRecord::new("/live/:id", "feed").with_cache_policy(CachePolicy::no_store()),
        ]);

        assert!(resolver.resolve("/live/1").await.is_some());
        assert!(resolver.resolve("/live/1").await.is_some());
        assert_eq!(resolver.cache().stats().writes, 0);
    }

    #[tokio::test]
    async fn test_pattern_ttl_overrides_default() {
        let (resolver, _) = resolver(vec![
            PatternRecord::new("/short", "page")
                .with_cache_policy(CachePolicy::with_ttl(Duration::from_millis(1))),
        ]);
        let resolver = resolver.with_default_ttl(Duration::from_secs(3600));

        resolver.resolve("/short").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        resolver.resolve("/short").await.unwrap();

        let stats = resolver.cache().stats();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.writes, 2);
    }
}
