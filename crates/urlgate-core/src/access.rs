//! Access evaluation for resolved resources.
//!
//! Access is granted when the resource is unrestricted, when the client is
//! listed explicitly, or when one of the client's static groups is allowed.
//! Evaluation is pure: it never touches caches or the network.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// Entries in `allowed_clients` that grant access to every client.
pub const ALLOW_ALL_SENTINELS: [&str; 2] = ["*", "all"];

// =============================================================================
// Client Groups
// =============================================================================

/// Static client → group membership table, maintained as configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientGroups(HashMap<String, Vec<String>>);

impl ClientGroups {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client with its groups.
    #[must_use]
    pub fn with_client<I, S>(mut self, client_id: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .insert(client_id.into(), groups.into_iter().map(Into::into).collect());
        self
    }

    /// Groups the client belongs to. Unknown clients belong to none.
    #[must_use]
    pub fn groups_for(&self, client_id: &str) -> &[String] {
        self.0.get(client_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of clients in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, Vec<String>>> for ClientGroups {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Vec<String>)> for ClientGroups {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Access Decision
// =============================================================================

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The resource has no client restriction (absent, empty or sentinel).
    Unrestricted,
    /// The client is listed in `allowed_clients`.
    ClientListed,
    /// The client belongs to an allowed group.
    GroupMember {
        /// The first matching group.
        group: String,
    },
    /// None of the rules granted access.
    Denied,
}

impl AccessDecision {
    /// Whether access was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

// =============================================================================
// Access Evaluator
// =============================================================================

/// Decides whether a client may use a resolved resource.
#[derive(Debug, Clone, Default)]
pub struct AccessEvaluator {
    groups: ClientGroups,
}

impl AccessEvaluator {
    /// Creates an evaluator backed by a static group table.
    #[must_use]
    pub fn new(groups: ClientGroups) -> Self {
        Self { groups }
    }

    /// Groups the client belongs to.
    #[must_use]
    pub fn groups_for(&self, client_id: &str) -> &[String] {
        self.groups.groups_for(client_id)
    }

    /// Whether the client may use the resource.
    #[must_use]
    pub fn has_access(&self, client_id: &str, resource: &Resource) -> bool {
        self.decide(client_id, resource).is_granted()
    }

    /// Evaluates access and reports which rule decided it.
    #[must_use]
    pub fn decide(&self, client_id: &str, resource: &Resource) -> AccessDecision {
        let allowed_clients = resource.allowed_clients.as_deref().unwrap_or_default();
        let allowed_groups = resource.allowed_groups.as_deref().unwrap_or_default();

        if allowed_clients
            .iter()
            .any(|c| ALLOW_ALL_SENTINELS.contains(&c.as_str()))
        {
            return AccessDecision::Unrestricted;
        }

        // A group list alone still restricts the resource.
        if allowed_clients.is_empty() && allowed_groups.is_empty() {
            return AccessDecision::Unrestricted;
        }

        if allowed_clients.iter().any(|c| c == client_id) {
            return AccessDecision::ClientListed;
        }

        self.groups
            .groups_for(client_id)
            .iter()
            .find(|group| allowed_groups.contains(group))
            .map_or(AccessDecision::Denied, |group| AccessDecision::GroupMember {
                group: group.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PatternRecord, ResourceMetadata};

    fn resource(allowed_clients: Option<Vec<&str>>, allowed_groups: Option<Vec<&str>>) -> Resource {
        let metadata = ResourceMetadata {
            allowed_clients: allowed_clients.map(|v| v.into_iter().map(String::from).collect()),
            allowed_groups: allowed_groups.map(|v| v.into_iter().map(String::from).collect()),
            ..ResourceMetadata::new("dashboard")
        };
        Resource::from_metadata("/x", "/x", HashMap::new(), &metadata)
    }

    fn evaluator() -> AccessEvaluator {
        AccessEvaluator::new(
            ClientGroups::new()
                .with_client("elpl", ["education"])
                .with_client("mercy", ["healthcare"])
                .with_client("both", ["healthcare", "education"]),
        )
    }

    #[test]
    fn test_absent_allow_lists_are_unrestricted() {
        let r = resource(None, None);
        assert_eq!(evaluator().decide("anyone", &r), AccessDecision::Unrestricted);
    }

    #[test]
    fn test_group_list_alone_restricts() {
        let r = resource(None, Some(vec!["education"]));
        assert!(evaluator().has_access("elpl", &r));
        assert!(!evaluator().has_access("mercy", &r));
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let r = resource(Some(vec![]), Some(vec![]));
        assert!(evaluator().has_access("anyone", &r));
    }

    #[test]
    fn test_wildcard_sentinels_grant_everyone() {
        for sentinel in ["*", "all"] {
            let r = resource(Some(vec!["elpl", sentinel]), None);
            assert!(evaluator().has_access("not-in-any-group", &r));
        }
    }

    #[test]
    fn test_listed_client_is_granted() {
        let r = resource(Some(vec!["elpl", "acme"]), None);
        assert_eq!(evaluator().decide("acme", &r), AccessDecision::ClientListed);
    }

    #[test]
    fn test_group_membership_grants() {
        let r = resource(Some(vec!["acme"]), Some(vec!["education"]));
        assert_eq!(
            evaluator().decide("elpl", &r),
            AccessDecision::GroupMember {
                group: "education".to_string()
            }
        );
        assert!(evaluator().has_access("both", &r));
    }

    #[test]
    fn test_other_group_is_denied() {
        let r = resource(Some(vec!["acme"]), Some(vec!["education"]));
        assert_eq!(evaluator().decide("mercy", &r), AccessDecision::Denied);
        assert!(!evaluator().has_access("mercy", &r));
    }

    #[test]
    fn test_unknown_client_is_denied() {
        let r = resource(Some(vec!["acme"]), Some(vec!["education"]));
        assert!(!evaluator().has_access("stranger", &r));
    }

    #[test]
    fn test_client_match_is_literal() {
        let r = resource(Some(vec!["ELPL"]), None);
        assert!(!evaluator().has_access("elpl", &r));
    }

    #[test]
    fn test_groups_deserialize_from_map() {
        let groups: ClientGroups = serde_json::from_value(serde_json::json!({
            "elpl": ["education"],
        }))
        .unwrap();
        assert_eq!(groups.groups_for("elpl"), ["education"]);
        assert!(groups.groups_for("nobody").is_empty());
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_decision_from_resolved_pattern() {
        let pattern = crate::pattern::Pattern::compile(
            &PatternRecord::new("/admin/*", "admin").with_allowed_clients(["all"]),
        )
        .unwrap();
        let r = pattern.resolve("/admin/users").unwrap();
        assert!(evaluator().has_access("whoever", &r));
    }
}
