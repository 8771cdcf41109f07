//! Policy aggregation for a subject
//!
//! Gathers every policy instance that applies to a user within an
//! organization: organization-level instances, instances on each of
//! the user's teams and their ancestors, and the user's own. Ancestry
//! comes from the materialized team path, one prefix walk per team
//! instead of recursive parent fetches.

use crate::directory::{DirectoryStore, Owner};
use crate::error::{AuthzError, Result};
use crate::policy::{Policy, PolicyStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::TeamPath;

/// A policy paired with one instance's variable bindings
///
/// The same policy appears once per applicable instance; aggregation
/// never deduplicates, so two instances of one policy with different
/// variables both take part in the decision.
#[derive(Debug, Clone)]
pub struct AttachedPolicy {
    /// The resolved policy
    pub policy: Policy,
    /// Variable bindings from the attaching instance
    pub variables: HashMap<String, String>,
}

/// Collects the applicable policies for (user, organization)
pub struct PolicyAggregator {
    directory: Arc<dyn DirectoryStore>,
    policies: Arc<dyn PolicyStore>,
}

impl PolicyAggregator {
    /// Create an aggregator over the two stores
    pub fn new(directory: Arc<dyn DirectoryStore>, policies: Arc<dyn PolicyStore>) -> Self {
        Self {
            directory,
            policies,
        }
    }

    /// Collect the policies applying to a user in an organization
    ///
    /// Broad to narrow: organization instances first, then for each of
    /// the user's teams its ancestors outermost-first followed by the
    /// team itself, then the user's own instances. `NotFound` when the
    /// user does not exist in the organization.
    pub async fn collect(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Vec<AttachedPolicy>> {
        let user = self
            .directory
            .get_user(user_id)
            .await?
            .filter(|u| u.organization_id == organization_id)
            .ok_or_else(|| {
                AuthzError::not_found(format!(
                    "user '{}' in organization '{}'",
                    user_id, organization_id
                ))
            })?;

        let mut attached = Vec::new();

        self.collect_owner(&Owner::organization(organization_id), organization_id, &mut attached)
            .await?;

        for team_id in &user.teams {
            let Some(team) = self.directory.get_team(team_id).await? else {
                warn!(team_id, user_id, "membership references a missing team");
                continue;
            };
            let path = TeamPath::new(&team.path)?;
            for ancestor_id in path.ancestors() {
                self.collect_owner(&Owner::team(ancestor_id.clone()), organization_id, &mut attached)
                    .await?;
            }
            self.collect_owner(&Owner::team(team_id.clone()), organization_id, &mut attached)
                .await?;
        }

        self.collect_owner(&Owner::user(user_id), organization_id, &mut attached)
            .await?;

        debug!(
            user_id,
            organization_id,
            count = attached.len(),
            "aggregated policy instances"
        );
        Ok(attached)
    }

    /// Append the resolved policies attached to one owner
    async fn collect_owner(
        &self,
        owner: &Owner,
        organization_id: &str,
        out: &mut Vec<AttachedPolicy>,
    ) -> Result<()> {
        for instance in self.directory.list_instances(owner).await? {
            let Some(policy) = self.policies.get(&instance.policy_id).await? else {
                warn!(policy_id = %instance.policy_id, owner = %owner, "instance references a missing policy");
                continue;
            };
            if !policy.visible_to(organization_id) {
                warn!(policy_id = %policy.id, owner = %owner, "instance references a foreign policy");
                continue;
            }
            out.push(AttachedPolicy {
                policy,
                variables: instance.variables,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectoryStore, PolicyInstance};
    use crate::policy::{Effect, InMemoryPolicyStore, Statement};
    use chrono::Utc;
    use warden_core::{Organization, Team, User};

    fn org(id: &str) -> Organization {
        Organization {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn team(id: &str, org_id: &str, parent: Option<&str>) -> Team {
        Team {
            id: id.to_string(),
            organization_id: org_id.to_string(),
            name: id.to_string(),
            description: String::new(),
            parent_id: parent.map(|s| s.to_string()),
            path: String::new(),
            users: vec![],
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn user(id: &str, org_id: &str) -> User {
        User {
            id: id.to_string(),
            organization_id: org_id.to_string(),
            name: id.to_string(),
            teams: vec![],
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    fn policy(id: &str, org: Option<&str>) -> Policy {
        Policy {
            id: id.to_string(),
            organization_id: org.map(|s| s.to_string()),
            name: id.to_string(),
            version: "1".to_string(),
            statements: vec![Statement {
                effect: Effect::Allow,
                actions: vec!["read".to_string()],
                resources: vec!["*".to_string()],
                sid: None,
            }],
            created_at: Utc::now(),
        }
    }

    fn instance(policy_id: &str, instance_id: &str) -> PolicyInstance {
        PolicyInstance {
            policy_id: policy_id.to_string(),
            instance: instance_id.to_string(),
            variables: HashMap::new(),
        }
    }

    async fn setup() -> (PolicyAggregator, Arc<InMemoryDirectoryStore>, Arc<InMemoryPolicyStore>) {
        let directory = Arc::new(InMemoryDirectoryStore::new());
        let policies = Arc::new(InMemoryPolicyStore::new());

        directory.create_organization(org("org1")).await.unwrap();
        directory.create_team(team("root", "org1", None)).await.unwrap();
        directory
            .create_team(team("mid", "org1", Some("root")))
            .await
            .unwrap();
        directory
            .create_team(team("leaf", "org1", Some("mid")))
            .await
            .unwrap();
        directory.create_user(user("alice", "org1")).await.unwrap();
        directory.add_team_member("leaf", "alice").await.unwrap();

        for id in ["p-org", "p-root", "p-mid", "p-leaf", "p-user"] {
            policies.create(policy(id, Some("org1"))).await.unwrap();
        }

        let aggregator = PolicyAggregator::new(directory.clone(), policies.clone());
        (aggregator, directory, policies)
    }

    #[tokio::test]
    async fn test_broad_to_narrow_order() {
        let (aggregator, directory, _) = setup().await;

        directory
            .add_instances(&Owner::organization("org1"), vec![instance("p-org", "i1")])
            .await
            .unwrap();
        directory
            .add_instances(&Owner::team("root"), vec![instance("p-root", "i2")])
            .await
            .unwrap();
        directory
            .add_instances(&Owner::team("mid"), vec![instance("p-mid", "i3")])
            .await
            .unwrap();
        directory
            .add_instances(&Owner::team("leaf"), vec![instance("p-leaf", "i4")])
            .await
            .unwrap();
        directory
            .add_instances(&Owner::user("alice"), vec![instance("p-user", "i5")])
            .await
            .unwrap();

        let attached = aggregator.collect("alice", "org1").await.unwrap();
        let order: Vec<&str> = attached.iter().map(|a| a.policy.id.as_str()).collect();
        assert_eq!(order, ["p-org", "p-root", "p-mid", "p-leaf", "p-user"]);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (aggregator, _, _) = setup().await;
        let result = aggregator.collect("ghost", "org1").await;
        assert!(matches!(result, Err(AuthzError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_wrong_organization_is_not_found() {
        let (aggregator, directory, _) = setup().await;
        directory.create_organization(org("org2")).await.unwrap();
        let result = aggregator.collect("alice", "org2").await;
        assert!(matches!(result, Err(AuthzError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_instances_kept() {
        let (aggregator, directory, _) = setup().await;
        directory
            .add_instances(
                &Owner::user("alice"),
                vec![instance("p-user", "i1"), instance("p-user", "i2")],
            )
            .await
            .unwrap();

        let attached = aggregator.collect("alice", "org1").await.unwrap();
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0].policy.id, "p-user");
        assert_eq!(attached[1].policy.id, "p-user");
    }

    #[tokio::test]
    async fn test_dangling_instance_skipped() {
        let (aggregator, directory, policies) = setup().await;
        directory
            .add_instances(&Owner::user("alice"), vec![instance("p-user", "i1")])
            .await
            .unwrap();
        policies.delete("p-user").await.unwrap();

        let attached = aggregator.collect("alice", "org1").await.unwrap();
        assert!(attached.is_empty());
    }

    #[tokio::test]
    async fn test_instance_variables_carried() {
        let (aggregator, directory, _) = setup().await;
        directory
            .add_instances(
                &Owner::user("alice"),
                vec![PolicyInstance {
                    policy_id: "p-user".to_string(),
                    instance: "i1".to_string(),
                    variables: HashMap::from([("var1".to_string(), "emea".to_string())]),
                }],
            )
            .await
            .unwrap();

        let attached = aggregator.collect("alice", "org1").await.unwrap();
        assert_eq!(attached[0].variables.get("var1"), Some(&"emea".to_string()));
    }
}
