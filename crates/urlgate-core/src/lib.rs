//! # urlgate-core
//!
//! Pure building blocks of the urlgate resolution engine:
//!
//! - [`pattern`] - Compiles pattern strings into ranked matchers
//! - [`resource`] - Pattern records and resolved resource descriptors
//! - [`access`] - Client / group access evaluation
//! - [`normalize`] - URL normalization used for matching and cache keys
//!
//! Nothing here performs I/O. Registry loading, caching and the resolver live
//! in `urlgate-resolver`.
//!
//! ## Example
//!
//! ```
//! use urlgate_core::{Pattern, PatternRecord, normalize_url};
//!
//! let record = PatternRecord::new("/clients/:clientId/:projectId", "project");
//! let pattern = Pattern::compile(&record).unwrap();
//!
//! let resource = pattern.resolve(&normalize_url("/clients/elpl/merit/")).unwrap();
//! assert_eq!(resource.param("clientId"), Some("elpl"));
//! assert_eq!(resource.param("projectId"), Some("merit"));
//! ```

pub mod access;
pub mod error;
pub mod normalize;
pub mod pattern;
pub mod resource;

pub use access::{ALLOW_ALL_SENTINELS, AccessDecision, AccessEvaluator, ClientGroups};
pub use error::CompileError;
pub use normalize::normalize_url;
pub use pattern::{Pattern, PatternKind, compile_all, specificity};
pub use resource::{
    AuthLevel, CachePolicy, ComponentRef, PatternRecord, Resource, ResourceMetadata,
};
