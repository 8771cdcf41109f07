//! Policy definition and storage
//!
//! A policy is a named, versioned list of Allow/Deny statements over
//! action and resource patterns. Policies are scoped to an organization
//! or shared (visible to every organization). Statements may carry
//! `${name}` placeholders resolved per attachment; see
//! [`crate::template`].

use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_core::OrganizationId;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresPolicyStore;

/// Unique policy identifier
pub type PolicyId = String;

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grant the matched actions on the matched resources
    Allow,
    /// Revoke the matched actions; Deny wins over any Allow
    Deny,
}

/// A single Allow/Deny rule within a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Whether matched requests are granted or refused
    pub effect: Effect,

    /// Action patterns; a request matches if any pattern matches
    pub actions: Vec<String>,

    /// Resource patterns; a request matches if any pattern matches
    pub resources: Vec<String>,

    /// Optional statement label for admin tooling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// A versioned list of statements, scoped to an organization or shared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier, unique within the service
    pub id: PolicyId,

    /// Owning organization; `None` marks a shared policy visible to all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<OrganizationId>,

    /// Display name
    pub name: String,

    /// Opaque caller-managed version string
    pub version: String,

    /// Ordered statement list; evaluated as a flat set, Deny wins
    pub statements: Vec<Statement>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Whether this policy is visible from the given organization
    ///
    /// Shared policies are visible everywhere; scoped policies only
    /// within their own organization.
    pub fn visible_to(&self, organization_id: &str) -> bool {
        match &self.organization_id {
            None => true,
            Some(org) => org == organization_id,
        }
    }

    /// Whether this policy is shared (not bound to any organization)
    pub fn is_shared(&self) -> bool {
        self.organization_id.is_none()
    }
}

/// Reference to a policy when attaching instances to an owner
///
/// Deserializes from either a bare policy id string or an object with
/// explicit per-instance variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyRef {
    /// Bare policy id; attaches with an empty variable bag
    Id(PolicyId),
    /// Policy id with per-instance variable bindings
    WithVariables {
        id: PolicyId,
        #[serde(default)]
        variables: HashMap<String, String>,
    },
}

impl PolicyRef {
    /// The referenced policy id
    pub fn policy_id(&self) -> &str {
        match self {
            PolicyRef::Id(id) => id,
            PolicyRef::WithVariables { id, .. } => id,
        }
    }

    /// The variable bindings carried by this reference
    pub fn variables(&self) -> HashMap<String, String> {
        match self {
            PolicyRef::Id(_) => HashMap::new(),
            PolicyRef::WithVariables { variables, .. } => variables.clone(),
        }
    }
}

/// Policy storage
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Store a new policy; `Conflict` if the id is taken
    async fn create(&self, policy: Policy) -> Result<()>;

    /// Get a policy by id
    async fn get(&self, id: &str) -> Result<Option<Policy>>;

    /// Rewrite name, version, and statements of an existing policy
    ///
    /// The stored organization scope is immutable; `NotFound` if the
    /// policy does not exist.
    async fn update(&self, policy: Policy) -> Result<()>;

    /// Delete a policy; `NotFound` if it does not exist
    async fn delete(&self, id: &str) -> Result<()>;

    /// List policies scoped to an organization, or shared policies
    /// when `organization_id` is `None`; ordered by id
    async fn list(&self, organization_id: Option<&str>) -> Result<Vec<Policy>>;
}

/// In-memory policy store
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<HashMap<PolicyId, Policy>>>,
}

impl InMemoryPolicyStore {
    /// Create a new in-memory policy store
    pub fn new() -> Self {
        Self {
            policies: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, policy: Policy) -> Result<()> {
        let mut policies = self.policies.write().await;
        if policies.contains_key(&policy.id) {
            return Err(AuthzError::conflict(format!(
                "policy '{}' already exists",
                policy.id
            )));
        }
        policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Policy>> {
        let policies = self.policies.read().await;
        Ok(policies.get(id).cloned())
    }

    async fn update(&self, policy: Policy) -> Result<()> {
        let mut policies = self.policies.write().await;
        let existing = policies
            .get_mut(&policy.id)
            .ok_or_else(|| AuthzError::not_found(format!("policy '{}'", policy.id)))?;

        existing.name = policy.name;
        existing.version = policy.version;
        existing.statements = policy.statements;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut policies = self.policies.write().await;
        policies
            .remove(id)
            .ok_or_else(|| AuthzError::not_found(format!("policy '{}'", id)))?;
        Ok(())
    }

    async fn list(&self, organization_id: Option<&str>) -> Result<Vec<Policy>> {
        let policies = self.policies.read().await;
        let mut matching: Vec<Policy> = policies
            .values()
            .filter(|p| p.organization_id.as_deref() == organization_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }
}
