//! Directory model types
//!
//! Organizations own teams and users; teams form a tree within their
//! organization. Policy attachment lives in `warden-authz`; these
//! records carry only directory state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique organization identifier
pub type OrganizationId = String;

/// Unique team identifier
pub type TeamId = String;

/// Unique user identifier
pub type UserId = String;

/// Free-form string metadata attached to directory entities
pub type Metadata = HashMap<String, String>;

/// An organization: the root ownership scope for teams, users, and
/// organization-scoped policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization identifier (caller-assigned or generated)
    pub id: OrganizationId,

    /// Display name
    pub name: String,

    /// Description shown in admin tooling
    pub description: String,

    /// Additional attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A team within an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Team identifier, unique within the service
    pub id: TeamId,

    /// Owning organization; immutable after creation
    pub organization_id: OrganizationId,

    /// Display name
    pub name: String,

    /// Description shown in admin tooling
    pub description: String,

    /// Parent team, if any; must belong to the same organization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TeamId>,

    /// Materialized path: dot-separated ancestor id chain ending in
    /// this team's own id. Always consistent with `parent_id`.
    pub path: String,

    /// Member user ids (derived view of membership)
    #[serde(default)]
    pub users: Vec<UserId>,

    /// Additional attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A user within an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier, unique within the service
    pub id: UserId,

    /// Owning organization; immutable after creation
    pub organization_id: OrganizationId,

    /// Display name
    pub name: String,

    /// Teams the user belongs to (derived view of membership)
    #[serde(default)]
    pub teams: Vec<TeamId>,

    /// Additional attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_serialization_skips_empty_fields() {
        let team = Team {
            id: "t1".to_string(),
            organization_id: "org1".to_string(),
            name: "Engineering".to_string(),
            description: "Engineering team".to_string(),
            parent_id: None,
            path: "t1".to_string(),
            users: vec![],
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&team).unwrap();
        assert!(json.get("parent_id").is_none());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["path"], "t1");
    }

    #[test]
    fn test_user_round_trip() {
        let user = User {
            id: "u1".to_string(),
            organization_id: "org1".to_string(),
            name: "Alice".to_string(),
            teams: vec!["t1".to_string()],
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        let back: User = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }
}
