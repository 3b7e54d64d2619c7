//! # urlgate-resolver
//!
//! Async resolution engine: pattern sources, the refreshable pattern
//! registry, the two-tier resolution cache, and the [`ResolverEngine`]
//! facade tying them to the access evaluator from `urlgate-core`.
//!
//! ## Flow
//!
//! ```text
//! resolve(url) -> normalize -> load registry if never loaded -> pin snapshot
//!              -> cache hit stamped with the snapshot fingerprint? -> return
//!              -> first match in the snapshot -> cache write -> return
//! has_access(client, resource) -> allow-list / group membership
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use urlgate_core::{ClientGroups, PatternRecord};
//! use urlgate_resolver::{ResolverEngine, StaticPatternSource};
//!
//! # tokio_test::block_on(async {
//! let source = Arc::new(StaticPatternSource::new(vec![
//!     PatternRecord::new("/clients/:clientId", "client-home").with_allowed_groups(["education"]),
//! ]));
//! let engine = ResolverEngine::builder(source)
//!     .client_groups(ClientGroups::new().with_client("acme", ["education"]))
//!     .build();
//!
//! let resource = engine.resolve("/clients/acme/").await.unwrap();
//! assert_eq!(resource.param("clientId"), Some("acme"));
//! assert!(engine.has_access("acme", &resource));
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod registry;
pub mod resolver;
pub mod source;

pub use cache::{CacheEntry, CacheStats, ResolutionCache, SweepHandle};
pub use config::{EngineConfig, StorageBackend, StorageConfig};
pub use engine::{ResolverEngine, ResolverEngineBuilder};
pub use error::{ConfigError, EngineError, FetchError, FetchResult};
pub use registry::{LoadOutcome, Registry, RegistrySnapshot};
pub use resolver::Resolver;
pub use source::{HttpPatternSource, PatternSource, StaticPatternSource, parse_records};
