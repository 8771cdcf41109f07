//! Validated policy attachment and cross-store administration
//!
//! The stores keep records; this layer enforces the rules that span
//! them: a policy must exist and be visible from the owner's
//! organization before it can be attached, deleting a policy detaches
//! every instance first, and organization creation can bootstrap a
//! default admin.

use crate::directory::{DirectoryStore, OwnedInstance, Owner, OwnerKind, PolicyInstance};
use crate::error::{AuthzError, Result};
use crate::policy::{Effect, Policy, PolicyRef, PolicyStore, Statement};
use crate::template::TemplateResolver;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use warden_core::{Organization, OrganizationId, User};

/// Admin user bootstrapped together with a new organization
#[derive(Debug, Clone)]
pub struct AdminUserSpec {
    /// Caller-assigned id; generated when `None`
    pub id: Option<String>,
    /// Display name
    pub name: String,
}

/// Name given to the bootstrapped full-access policy
const DEFAULT_ADMIN_POLICY_NAME: &str = "Default Admin Policy";

/// Coordinates the directory and policy stores for attachment rules
pub struct InstanceManager {
    directory: Arc<dyn DirectoryStore>,
    policies: Arc<dyn PolicyStore>,
    resolver: TemplateResolver,
}

impl InstanceManager {
    /// Create a manager over the two stores
    pub fn new(directory: Arc<dyn DirectoryStore>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            directory,
            policies,
            resolver: TemplateResolver::new(),
        }
    }

    /// Organization the owner entity belongs to
    ///
    /// `NotFound` when the entity does not exist.
    async fn owner_organization(&self, owner: &Owner) -> Result<OrganizationId> {
        match owner.kind {
            OwnerKind::Organization => {
                self.directory
                    .get_organization(&owner.id)
                    .await?
                    .ok_or_else(|| AuthzError::not_found(format!("organization '{}'", owner.id)))?;
                Ok(owner.id.clone())
            }
            OwnerKind::Team => {
                let team = self
                    .directory
                    .get_team(&owner.id)
                    .await?
                    .ok_or_else(|| AuthzError::not_found(format!("team '{}'", owner.id)))?;
                Ok(team.organization_id)
            }
            OwnerKind::User => {
                let user = self
                    .directory
                    .get_user(&owner.id)
                    .await?
                    .ok_or_else(|| AuthzError::not_found(format!("user '{}'", owner.id)))?;
                Ok(user.organization_id)
            }
        }
    }

    /// Turn policy references into instances, enforcing visibility
    ///
    /// Every referenced policy must exist and be either shared or
    /// scoped to the owner's organization. A fresh instance id is
    /// minted per reference, repeated policy ids included.
    async fn materialize(&self, organization_id: &str, refs: &[PolicyRef]) -> Result<Vec<PolicyInstance>> {
        let mut instances = Vec::with_capacity(refs.len());
        for policy_ref in refs {
            let policy_id = policy_ref.policy_id();
            let policy = self
                .policies
                .get(policy_id)
                .await?
                .filter(|p| p.visible_to(organization_id))
                .ok_or_else(|| AuthzError::not_found(format!("policy '{}'", policy_id)))?;

            instances.push(PolicyInstance {
                policy_id: policy.id,
                instance: Uuid::new_v4().to_string(),
                variables: policy_ref.variables(),
            });
        }
        Ok(instances)
    }

    /// Attach policies to an owner, appending to existing instances
    pub async fn add_instances(
        &self,
        owner: &Owner,
        refs: &[PolicyRef],
    ) -> Result<Vec<PolicyInstance>> {
        let organization_id = self.owner_organization(owner).await?;
        let instances = self.materialize(&organization_id, refs).await?;

        debug!(owner = %owner, count = instances.len(), "attaching policy instances");
        self.directory.add_instances(owner, instances.clone()).await?;
        Ok(instances)
    }

    /// Replace an owner's attachments; an empty list clears them all
    pub async fn replace_instances(
        &self,
        owner: &Owner,
        refs: &[PolicyRef],
    ) -> Result<Vec<PolicyInstance>> {
        let organization_id = self.owner_organization(owner).await?;
        let instances = self.materialize(&organization_id, refs).await?;

        debug!(owner = %owner, count = instances.len(), "replacing policy instances");
        self.directory
            .replace_instances(owner, instances.clone())
            .await?;
        Ok(instances)
    }

    /// Detach a policy from an owner
    ///
    /// With an instance id, exactly that instance; without, every
    /// instance of the policy. Detaching nothing is not an error.
    pub async fn delete_instance(
        &self,
        owner: &Owner,
        policy_id: &str,
        instance_id: Option<&str>,
    ) -> Result<u64> {
        self.directory
            .delete_instances(owner, policy_id, instance_id)
            .await
    }

    /// List an owner's attachments in creation order
    pub async fn list_instances(&self, owner: &Owner) -> Result<Vec<PolicyInstance>> {
        self.directory.list_instances(owner).await
    }

    /// Every attachment of a policy across all owners
    pub async fn policy_instances(&self, policy_id: &str) -> Result<Vec<OwnedInstance>> {
        self.require_policy(policy_id).await?;
        self.directory.instances_of(policy_id).await
    }

    /// Distinct `${name}` placeholders used by a policy's statements
    pub async fn policy_variables(&self, policy_id: &str) -> Result<BTreeSet<String>> {
        let policy = self.require_policy(policy_id).await?;
        Ok(self.resolver.variable_names(&policy.statements))
    }

    /// Delete a policy, detaching every instance of it first
    pub async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        self.require_policy(policy_id).await?;

        let detached = self.directory.detach_policy(policy_id).await?;
        info!(policy_id, detached, "deleting policy");
        self.policies.delete(policy_id).await
    }

    /// Create an organization, optionally bootstrapping an admin user
    /// holding a full-access policy scoped to the new organization
    pub async fn create_organization(
        &self,
        organization: Organization,
        admin: Option<AdminUserSpec>,
    ) -> Result<(Organization, Option<User>)> {
        let organization = self.directory.create_organization(organization).await?;

        let Some(spec) = admin else {
            return Ok((organization, None));
        };

        let user = self
            .directory
            .create_user(User {
                id: spec.id.unwrap_or_default(),
                organization_id: organization.id.clone(),
                name: spec.name,
                teams: vec![],
                metadata: Default::default(),
                created_at: Utc::now(),
            })
            .await?;

        let policy = Policy {
            id: Uuid::new_v4().to_string(),
            organization_id: Some(organization.id.clone()),
            name: DEFAULT_ADMIN_POLICY_NAME.to_string(),
            version: "1".to_string(),
            statements: vec![Statement {
                effect: Effect::Allow,
                actions: vec!["*".to_string()],
                resources: vec!["*".to_string()],
                sid: None,
            }],
            created_at: Utc::now(),
        };
        self.policies.create(policy.clone()).await?;
        self.add_instances(&Owner::user(user.id.clone()), &[PolicyRef::Id(policy.id)])
            .await?;

        info!(organization_id = %organization.id, admin = %user.id, "bootstrapped organization admin");
        Ok((organization, Some(user)))
    }

    async fn require_policy(&self, policy_id: &str) -> Result<Policy> {
        self.policies
            .get(policy_id)
            .await?
            .ok_or_else(|| AuthzError::not_found(format!("policy '{}'", policy_id)))
    }
}
