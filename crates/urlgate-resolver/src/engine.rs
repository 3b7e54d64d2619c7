//! The resolver engine facade.
//!
//! [`ResolverEngine`] owns one registry, one cache and one access evaluator.
//! Construct it once per process and share it by reference (or `Arc`).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};
use url::Url;
use urlgate_core::{AccessDecision, AccessEvaluator, ClientGroups, Resource};
use urlgate_storage::{DynStore, FileStore, MemoryStore, StoreQuota};

use crate::cache::{self, CacheStats, ResolutionCache, SweepHandle};
use crate::config::{EngineConfig, StorageBackend};
use crate::error::{ConfigError, EngineError};
use crate::observability;
use crate::registry::{self, LoadOutcome, Registry};
use crate::resolver::{self, Resolver};
use crate::source::{HttpPatternSource, PatternSource, StaticPatternSource};

/// Resolves URLs to resources and evaluates access to them.
#[derive(Debug)]
pub struct ResolverEngine {
    resolver: Resolver,
    evaluator: AccessEvaluator,
    sweep_interval: Duration,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl ResolverEngine {
    /// Starts building an engine over `source`.
    #[must_use]
    pub fn builder(source: Arc<dyn PatternSource>) -> ResolverEngineBuilder {
        ResolverEngineBuilder::new(source)
    }

    /// Builds an engine from configuration.
    ///
    /// Uses an HTTP source when `pattern_source_url` is set and the inline
    /// `patterns` otherwise. A configured `log_level` is applied to the
    /// subscriber installed by [`init_tracing`](crate::observability::init_tracing).
    /// When called inside a tokio runtime with a non-zero `sweep_interval`,
    /// the cache sweeper is started; otherwise call
    /// [`ResolverEngine::start_sweeper`] once a runtime is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the HTTP client
    /// cannot be built or the file store cannot be opened.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        if let Some(level) = &config.log_level {
            let applied = observability::set_log_level(level)?;
            debug!(level = %level, applied, "Log level configured");
        }

        let source: Arc<dyn PatternSource> = match &config.pattern_source_url {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|e| {
                    ConfigError::validation(format!("pattern_source_url is not a valid URL: {e}"))
                })?;
                Arc::new(HttpPatternSource::new(url, config.fetch_timeout)?)
            }
            None => Arc::new(StaticPatternSource::new(config.patterns.clone())),
        };

        let quota = config
            .storage
            .max_entries
            .map_or_else(StoreQuota::unlimited, StoreQuota::entries);
        let store: DynStore = match (config.storage.backend, &config.storage.path) {
            (StorageBackend::File, Some(path)) => Arc::new(FileStore::open_with_quota(path, quota)?),
            (StorageBackend::File, None) => {
                return Err(ConfigError::validation("storage.path is required for the file backend").into());
            }
            (StorageBackend::Memory, _) => Arc::new(MemoryStore::with_quota(quota)),
        };

        info!(
            source = source.name(),
            store = store.name(),
            capacity = config.cache_capacity,
            "Resolver engine configured"
        );

        let engine = Self::builder(source)
            .store(store)
            .key_prefix(&config.key_prefix)
            .default_ttl(config.default_ttl)
            .snapshot_ttl(config.snapshot_ttl)
            .fetch_timeout(config.fetch_timeout)
            .cache_capacity(config.cache_capacity)
            .eviction_fraction(config.eviction_fraction)
            .sweep_interval(config.sweep_interval)
            .client_groups(config.client_groups())
            .build();

        if config.sweeper_enabled() && tokio::runtime::Handle::try_current().is_ok() {
            engine.start_sweeper();
        }
        Ok(engine)
    }

    /// Resolves `url`, or returns `None` when no pattern matches.
    pub async fn resolve(&self, url: &str) -> Option<Resource> {
        self.resolver.resolve(url).await
    }

    /// Whether `client_id` may use `resource`.
    #[must_use]
    pub fn has_access(&self, client_id: &str, resource: &Resource) -> bool {
        self.evaluator.has_access(client_id, resource)
    }

    /// The access decision for `client_id` with the rule that produced it.
    #[must_use]
    pub fn decide(&self, client_id: &str, resource: &Resource) -> AccessDecision {
        self.evaluator.decide(client_id, resource)
    }

    /// Resolves `url` and evaluates access for `client_id` in one call.
    pub async fn resolve_for(&self, client_id: &str, url: &str) -> Option<(Resource, bool)> {
        let resource = self.resolve(url).await?;
        let allowed = self.has_access(client_id, &resource);
        Some((resource, allowed))
    }

    /// Loads or refreshes the pattern registry.
    ///
    /// Installing a list that differs from the one it replaces also clears
    /// the resolution cache.
    pub async fn load(&self, force_refresh: bool) -> LoadOutcome {
        self.resolver.load(force_refresh).await
    }

    /// Starts the periodic cache sweep. Returns false if it is disabled or
    /// already running.
    ///
    /// [`ResolverEngine::from_config`] calls this itself when it runs inside
    /// a tokio runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) -> bool {
        if self.sweep_interval.is_zero() {
            return false;
        }
        let mut sweeper = match self.sweeper.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if sweeper.is_some() {
            return false;
        }
        *sweeper = Some(self.resolver.cache().spawn_sweeper(self.sweep_interval));
        true
    }

    /// Whether the periodic cache sweep is running.
    #[must_use]
    pub fn sweeper_running(&self) -> bool {
        match self.sweeper.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|h| !h.is_finished()),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|h| !h.is_finished()),
        }
    }

    /// Stops background tasks.
    pub async fn shutdown(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
            debug!("Resolver engine shut down");
        }
    }

    /// The pattern registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.resolver.registry()
    }

    /// The resolution cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResolutionCache> {
        self.resolver.cache()
    }

    /// The access evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &AccessEvaluator {
        &self.evaluator
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ResolverEngine`].
pub struct ResolverEngineBuilder {
    source: Arc<dyn PatternSource>,
    store: Option<DynStore>,
    key_prefix: String,
    default_ttl: Duration,
    snapshot_ttl: Duration,
    fetch_timeout: Duration,
    cache_capacity: usize,
    eviction_fraction: f64,
    sweep_interval: Duration,
    client_groups: ClientGroups,
}

impl ResolverEngineBuilder {
    fn new(source: Arc<dyn PatternSource>) -> Self {
        Self {
            source,
            store: None,
            key_prefix: "urlgate:".to_string(),
            default_ttl: resolver::DEFAULT_TTL,
            snapshot_ttl: registry::DEFAULT_SNAPSHOT_TTL,
            fetch_timeout: registry::DEFAULT_FETCH_TIMEOUT,
            cache_capacity: cache::DEFAULT_CAPACITY,
            eviction_fraction: cache::DEFAULT_EVICTION_FRACTION,
            sweep_interval: Duration::from_secs(60),
            client_groups: ClientGroups::new(),
        }
    }

    /// Persisted store. Defaults to an unlimited [`MemoryStore`].
    #[must_use]
    pub fn store(mut self, store: DynStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Namespace for persisted keys.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// TTL for patterns without their own.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Age after which the registry is refetched.
    #[must_use]
    pub fn snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Bound on one fetch of the pattern source.
    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Soft capacity of the persisted cache.
    #[must_use]
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Share of persisted entries evicted when the cache is full.
    #[must_use]
    pub fn eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = fraction;
        self
    }

    /// Cadence of [`ResolverEngine::start_sweeper`]. Zero disables it.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Client to group membership table.
    #[must_use]
    pub fn client_groups(mut self, groups: ClientGroups) -> Self {
        self.client_groups = groups;
        self
    }

    /// Builds the engine. Nothing is fetched until the first load or resolve.
    #[must_use]
    pub fn build(self) -> ResolverEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as DynStore);

        let registry = Registry::new(self.source, store.clone(), &self.key_prefix)
            .with_snapshot_ttl(self.snapshot_ttl)
            .with_fetch_timeout(self.fetch_timeout);
        let cache = ResolutionCache::new(store, &self.key_prefix)
            .with_capacity(self.cache_capacity)
            .with_eviction_fraction(self.eviction_fraction);
        let resolver = Resolver::new(Arc::new(registry), Arc::new(cache))
            .with_default_ttl(self.default_ttl);

        ResolverEngine {
            resolver,
            evaluator: AccessEvaluator::new(self.client_groups),
            sweep_interval: self.sweep_interval,
            sweeper: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlgate_core::PatternRecord;

    fn engine(source: Arc<StaticPatternSource>) -> ResolverEngine {
        ResolverEngine::builder(source)
            .client_groups(
                ClientGroups::new()
                    .with_client("acme", ["education"])
                    .with_client("mercy", ["healthcare"]),
            )
            .build()
    }

    fn records() -> Vec<PatternRecord> {
        vec![
            PatternRecord::new("/courses/:courseId", "course").with_allowed_groups(["education"]),
            PatternRecord::new("/public/*", "public").with_allowed_clients(["*"]),
        ]
    }

    #[tokio::test]
    async fn test_resolve_for_combines_resolution_and_access() {
        let engine = engine(Arc::new(StaticPatternSource::new(records())));

        let (resource, allowed) = engine.resolve_for("acme", "/courses/101").await.unwrap();
        assert_eq!(resource.param("courseId"), Some("101"));
        assert!(allowed);

        let (_, allowed) = engine.resolve_for("mercy", "/courses/101").await.unwrap();
        assert!(!allowed);

        let (_, allowed) = engine.resolve_for("stranger", "/public/faq").await.unwrap();
        assert!(allowed);

        assert!(engine.resolve_for("acme", "/nowhere").await.is_none());
    }

    #[tokio::test]
    async fn test_changed_refresh_clears_cache() {
        let source = Arc::new(StaticPatternSource::new(records()));
        let engine = engine(source.clone());

        engine.resolve("/courses/101").await.unwrap();
        assert_eq!(engine.cache().memory_len(), 1);

        // Identical records keep the cache.
        assert!(matches!(
            engine.load(true).await,
            LoadOutcome::Refreshed { changed: false, .. }
        ));
        assert_eq!(engine.cache().memory_len(), 1);

        source.replace(vec![PatternRecord::new("/courses/:id", "course-v2")]);
        assert!(engine.load(true).await.replaced_patterns());
        assert_eq!(engine.cache().memory_len(), 0);

        let resource = engine.resolve("/courses/101").await.unwrap();
        assert_eq!(resource.resource_type, "course-v2");
    }

    #[tokio::test]
    async fn test_sweeper_lifecycle() {
        let engine = engine(Arc::new(StaticPatternSource::new(records())));
        assert!(engine.start_sweeper());
        assert!(!engine.start_sweeper());
        engine.shutdown().await;

        let disabled = ResolverEngine::builder(Arc::new(StaticPatternSource::default()))
            .sweep_interval(Duration::ZERO)
            .build();
        assert!(!disabled.start_sweeper());
    }

    #[tokio::test]
    async fn test_from_config_with_inline_patterns() {
        let config = EngineConfig {
            patterns: records(),
            client_groups: [("acme".to_string(), vec!["education".to_string()])]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let engine = ResolverEngine::from_config(&config).unwrap();

        let (_, allowed) = engine.resolve_for("acme", "/courses/7").await.unwrap();
        assert!(allowed);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_from_config_starts_configured_sweeper() {
        let config = EngineConfig {
            patterns: records(),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let engine = ResolverEngine::from_config(&config).unwrap();
        assert!(engine.sweeper_running());
        assert!(!engine.start_sweeper());

        let resource = engine.resolve("/courses/101").await.unwrap();
        let fingerprint = engine.registry().snapshot().fingerprint().to_string();
        engine
            .cache()
            .set("/courses/102", resource, Duration::from_millis(1), &fingerprint);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(engine.cache_stats().swept >= 1);

        engine.shutdown().await;
        assert!(!engine.sweeper_running());
    }

    #[tokio::test]
    async fn test_from_config_respects_disabled_sweeper() {
        let config = EngineConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        let engine = ResolverEngine::from_config(&config).unwrap();
        assert!(!engine.sweeper_running());
    }

    #[test]
    fn test_from_config_outside_runtime_defers_sweeper() {
        let engine = ResolverEngine::from_config(&EngineConfig::default()).unwrap();
        assert!(!engine.sweeper_running());

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            assert!(engine.start_sweeper());
            engine.shutdown().await;
        });
    }

    #[tokio::test]
    async fn test_from_config_applies_log_level() {
        observability::init_tracing("info");
        let config = EngineConfig {
            log_level: Some("urlgate_resolver=debug,warn".to_string()),
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        ResolverEngine::from_config(&config).unwrap();

        let invalid = EngineConfig {
            log_level: Some("urlgate_resolver=loud".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ResolverEngine::from_config(&invalid),
            Err(EngineError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = EngineConfig {
            eviction_fraction: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            ResolverEngine::from_config(&config),
            Err(EngineError::Config(_))
        ));
    }
}
