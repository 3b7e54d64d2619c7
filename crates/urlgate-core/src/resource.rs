//! Resource descriptors and pattern records.
//!
//! A [`PatternRecord`] is the JSON shape served by the pattern source:
//!
//! ```json
//! {
//!   "pattern": "/clients/:clientId/:projectId",
//!   "resourceType": "project-dashboard",
//!   "authLevel": "authenticated",
//!   "components": ["ProjectHeader", { "name": "ChatWidget", "src": "/js/chat.js" }],
//!   "allowedClients": ["elpl"],
//!   "allowedGroups": ["education"],
//!   "cachePolicy": { "ttl": "10m" }
//! }
//! ```
//!
//! A [`Resource`] is the value produced by a successful resolution. It is owned
//! by whoever asked for it and carries the access rules of the matched pattern.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Auth Level
// =============================================================================

/// Authentication level a resource expects from the caller.
///
/// Informational for the engine; enforcement happens server-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    /// No authentication needed.
    #[serde(alias = "none", alias = "anonymous")]
    Public,
    /// Any authenticated client.
    #[default]
    #[serde(alias = "user", alias = "client")]
    Authenticated,
    /// Administrative access.
    Admin,
}

impl AuthLevel {
    /// Returns the level as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Authenticated => "authenticated",
            Self::Admin => "admin",
        }
    }
}

// =============================================================================
// Cache Policy
// =============================================================================

/// Per-pattern caching rules for resolutions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachePolicy {
    /// Resolution TTL. Falls back to the engine default when absent.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,

    /// Never write resolutions of this pattern to the cache.
    pub no_store: bool,
}

impl CachePolicy {
    /// Creates a policy with an explicit TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            no_store: false,
        }
    }

    /// Creates a policy that disables caching.
    #[must_use]
    pub fn no_store() -> Self {
        Self {
            ttl: None,
            no_store: true,
        }
    }

    /// Effective TTL given the engine default.
    #[must_use]
    pub fn effective_ttl(&self, default_ttl: Duration) -> Duration {
        self.ttl.unwrap_or(default_ttl)
    }
}

// =============================================================================
// Component Reference
// =============================================================================

/// A UI component the caller should mount for a resource.
///
/// Deserializes from either a bare name (`"ChatWidget"`) or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ComponentRefRepr")]
pub struct ComponentRef {
    /// Component name.
    pub name: String,

    /// Optional script or bundle location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// Static props passed to the component.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
}

impl ComponentRef {
    /// Creates a component reference with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: None,
            props: Map::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ComponentRefRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        props: Map<String, Value>,
    },
}

impl From<ComponentRefRepr> for ComponentRef {
    fn from(repr: ComponentRefRepr) -> Self {
        match repr {
            ComponentRefRepr::Name(name) => Self::named(name),
            ComponentRefRepr::Full { name, src, props } => Self { name, src, props },
        }
    }
}

// =============================================================================
// Resource Metadata / Pattern Record
// =============================================================================

/// Metadata attached to a pattern and copied into every resolution of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Stable identifier of the resource. The raw pattern is used when absent.
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Kind of resource (e.g. "admin-dashboard", "chat").
    pub resource_type: String,

    /// Expected authentication level.
    #[serde(default)]
    pub auth_level: AuthLevel,

    /// Components to mount.
    #[serde(default)]
    pub components: Vec<ComponentRef>,

    /// Clients allowed to use the resource. `"*"` or `"all"` allows everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_clients: Option<Vec<String>>,

    /// Groups allowed to use the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_groups: Option<Vec<String>>,

    /// Caching rules for resolutions.
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

impl ResourceMetadata {
    /// Creates metadata for a resource type with all other fields defaulted.
    #[must_use]
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }
}

/// One record served by the pattern source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    /// Raw pattern text.
    pub pattern: String,

    /// Resource metadata.
    #[serde(flatten)]
    pub metadata: ResourceMetadata,
}

impl PatternRecord {
    /// Creates a record for a pattern and resource type.
    #[must_use]
    pub fn new(pattern: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            metadata: ResourceMetadata::new(resource_type),
        }
    }

    /// Sets the resource identifier.
    #[must_use]
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.resource_id = Some(id.into());
        self
    }

    /// Sets the auth level.
    #[must_use]
    pub fn with_auth_level(mut self, level: AuthLevel) -> Self {
        self.metadata.auth_level = level;
        self
    }

    /// Sets the allowed clients.
    #[must_use]
    pub fn with_allowed_clients<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.allowed_clients = Some(clients.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the allowed groups.
    #[must_use]
    pub fn with_allowed_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.allowed_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a component reference.
    #[must_use]
    pub fn with_component(mut self, component: ComponentRef) -> Self {
        self.metadata.components.push(component);
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.metadata.cache_policy = policy;
        self
    }
}

// =============================================================================
// Resource
// =============================================================================

/// Descriptor produced by resolving a URL against the pattern registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Normalized URL that was resolved.
    pub url: String,

    /// Identifier of the matched pattern.
    pub pattern_id: String,

    /// Parameters extracted from the URL, keyed by declared name.
    pub params: HashMap<String, String>,

    /// Kind of resource.
    pub resource_type: String,

    /// Expected authentication level.
    pub auth_level: AuthLevel,

    /// Components to mount.
    pub components: Vec<ComponentRef>,

    /// Clients allowed to use the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_clients: Option<Vec<String>>,

    /// Groups allowed to use the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_groups: Option<Vec<String>>,

    /// Caching rules copied from the pattern.
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

impl Resource {
    /// Builds a resource from pattern metadata and extracted parameters.
    #[must_use]
    pub fn from_metadata(
        url: impl Into<String>,
        pattern_id: impl Into<String>,
        params: HashMap<String, String>,
        metadata: &ResourceMetadata,
    ) -> Self {
        Self {
            url: url.into(),
            pattern_id: pattern_id.into(),
            params,
            resource_type: metadata.resource_type.clone(),
            auth_level: metadata.auth_level,
            components: metadata.components.clone(),
            allowed_clients: metadata.allowed_clients.clone(),
            allowed_groups: metadata.allowed_groups.clone(),
            cache_policy: metadata.cache_policy.clone(),
        }
    }

    /// Returns an extracted parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
