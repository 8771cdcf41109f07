//! Directory storage: organizations, teams, users, policy attachments
//!
//! The directory owns the entity records and the policy instances
//! attached to them. Team hierarchy is kept as materialized paths
//! (see `warden_core::hierarchy`); a team move rewrites the paths of
//! the whole subtree in one operation.

use crate::error::{AuthzError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use warden_core::{Organization, Team, TeamPath, User};

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDirectoryStore;

/// Unique policy instance identifier
pub type InstanceId = String;

/// Kind of entity a policy instance is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Organization,
    Team,
    User,
}

impl OwnerKind {
    /// Stable lowercase name, used for storage and wire formats
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Organization => "organization",
            OwnerKind::Team => "team",
            OwnerKind::User => "user",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity a policy instance is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    /// Entity kind
    pub kind: OwnerKind,
    /// Entity id
    pub id: String,
}

impl Owner {
    /// Attachment target for an organization
    pub fn organization(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Organization,
            id: id.into(),
        }
    }

    /// Attachment target for a team
    pub fn team(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Team,
            id: id.into(),
        }
    }

    /// Attachment target for a user
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::User,
            id: id.into(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A policy attached to an owner with per-instance variable bindings
///
/// The same policy may be attached to one owner several times, even
/// with identical variables; each attachment keeps its own instance id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInstance {
    /// Attached policy
    pub policy_id: String,

    /// Instance identifier, unique per owner and policy
    pub instance: InstanceId,

    /// Variable bindings substituted into the policy's statements
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
}

/// A policy instance together with the owner it is attached to
///
/// Returned by the reverse lookup over all owners of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedInstance {
    /// Entity the instance is attached to
    pub owner: Owner,
    /// The attachment itself
    pub instance: PolicyInstance,
}

/// Directory storage: entity lifecycle, membership, policy attachments
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Store a new organization; generates an id when none is given
    async fn create_organization(&self, organization: Organization) -> Result<Organization>;

    /// Get an organization by id
    async fn get_organization(&self, id: &str) -> Result<Option<Organization>>;

    /// Delete an organization and everything it owns: teams, users,
    /// memberships, and every policy instance attached to any of them
    async fn delete_organization(&self, id: &str) -> Result<()>;

    /// Store a new team; computes its path from `parent_id`
    ///
    /// The owning organization must exist; the parent (if any) must
    /// exist and belong to the same organization.
    async fn create_team(&self, team: Team) -> Result<Team>;

    /// Get a team by id, member list populated
    async fn get_team(&self, id: &str) -> Result<Option<Team>>;

    /// Re-parent a team and rewrite every descendant path
    ///
    /// `Validation` when the new parent sits inside the moved subtree
    /// or belongs to another organization.
    async fn move_team(&self, id: &str, new_parent_id: Option<&str>) -> Result<Team>;

    /// Delete a team and its whole subtree, including memberships and
    /// policy instances of every deleted team
    async fn delete_team(&self, id: &str) -> Result<()>;

    /// Store a new user; generates an id when none is given
    async fn create_user(&self, user: User) -> Result<User>;

    /// Get a user by id, team list populated
    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// Delete a user, its memberships, and its policy instances
    async fn delete_user(&self, id: &str) -> Result<()>;

    /// Add a user to a team; both must belong to the same organization
    async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<()>;

    /// Remove a user from a team; Ok when not a member
    async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<()>;

    /// Replace a team's member list
    async fn replace_team_members(&self, team_id: &str, user_ids: Vec<String>) -> Result<()>;

    /// Append policy instances to an owner, preserving order
    async fn add_instances(&self, owner: &Owner, instances: Vec<PolicyInstance>) -> Result<()>;

    /// Atomically replace an owner's instances; empty clears them all
    async fn replace_instances(&self, owner: &Owner, instances: Vec<PolicyInstance>) -> Result<()>;

    /// Remove instances of a policy from an owner
    ///
    /// With an instance id removes exactly that instance, without one
    /// removes every instance of the policy. Returns the number
    /// removed; removing nothing is not an error.
    async fn delete_instances(
        &self,
        owner: &Owner,
        policy_id: &str,
        instance_id: Option<&str>,
    ) -> Result<u64>;

    /// List an owner's instances in creation order
    async fn list_instances(&self, owner: &Owner) -> Result<Vec<PolicyInstance>>;

    /// Reverse lookup: every attachment of a policy across all owners,
    /// ordered organization, team, user, then creation order
    async fn instances_of(&self, policy_id: &str) -> Result<Vec<OwnedInstance>>;

    /// Remove every attachment of a policy. Returns the number removed
    async fn detach_policy(&self, policy_id: &str) -> Result<u64>;
}

/// Instance with its global creation sequence number
#[derive(Debug, Clone)]
struct StoredInstance {
    seq: u64,
    instance: PolicyInstance,
}

#[derive(Debug, Default)]
struct DirectoryState {
    organizations: HashMap<String, Organization>,
    teams: HashMap<String, Team>,
    users: HashMap<String, User>,
    instances: HashMap<Owner, Vec<StoredInstance>>,
    next_seq: u64,
}

impl DirectoryState {
    fn owner_exists(&self, owner: &Owner) -> bool {
        match owner.kind {
            OwnerKind::Organization => self.organizations.contains_key(&owner.id),
            OwnerKind::Team => self.teams.contains_key(&owner.id),
            OwnerKind::User => self.users.contains_key(&owner.id),
        }
    }

    fn require_owner(&self, owner: &Owner) -> Result<()> {
        if self.owner_exists(owner) {
            return Ok(());
        }
        Err(AuthzError::not_found(format!("{}", owner)))
    }

    fn push_instances(&mut self, owner: &Owner, instances: Vec<PolicyInstance>) {
        let slot = self.instances.entry(owner.clone()).or_default();
        for instance in instances {
            let seq = self.next_seq;
            self.next_seq += 1;
            slot.push(StoredInstance { seq, instance });
        }
    }

    /// Drop every instance attached to the given owner
    fn purge_owner(&mut self, owner: &Owner) {
        self.instances.remove(owner);
    }

    /// Remove a user id from every team member list
    fn forget_member(&mut self, user_id: &str) {
        for team in self.teams.values_mut() {
            team.users.retain(|u| u != user_id);
        }
    }

    /// Team ids of the subtree rooted at `path`, the root included
    fn subtree_ids(&self, organization_id: &str, path: &TeamPath) -> Vec<String> {
        let mut ids: Vec<&Team> = self
            .teams
            .values()
            .filter(|t| t.organization_id == organization_id)
            .filter(|t| {
                TeamPath::new(&t.path)
                    .map(|p| p.is_within(path))
                    .unwrap_or(false)
            })
            .collect();
        ids.sort_by(|a, b| a.path.cmp(&b.path));
        ids.into_iter().map(|t| t.id.clone()).collect()
    }
}

/// In-memory directory store
pub struct InMemoryDirectoryStore {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectoryStore {
    /// Create a new in-memory directory store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(DirectoryState::default())),
        }
    }
}

impl Default for InMemoryDirectoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn create_organization(&self, mut organization: Organization) -> Result<Organization> {
        let mut state = self.state.write().await;

        if organization.id.is_empty() {
            organization.id = Uuid::new_v4().to_string();
        }
        if state.organizations.contains_key(&organization.id) {
            return Err(AuthzError::conflict(format!(
                "organization '{}' already exists",
                organization.id
            )));
        }

        state
            .organizations
            .insert(organization.id.clone(), organization.clone());
        Ok(organization)
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        let state = self.state.read().await;
        Ok(state.organizations.get(id).cloned())
    }

    async fn delete_organization(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if state.organizations.remove(id).is_none() {
            return Err(AuthzError::not_found(format!("organization '{}'", id)));
        }

        let team_ids: Vec<String> = state
            .teams
            .values()
            .filter(|t| t.organization_id == id)
            .map(|t| t.id.clone())
            .collect();
        let user_ids: Vec<String> = state
            .users
            .values()
            .filter(|u| u.organization_id == id)
            .map(|u| u.id.clone())
            .collect();

        for team_id in &team_ids {
            state.teams.remove(team_id);
            state.purge_owner(&Owner::team(team_id.clone()));
        }
        for user_id in &user_ids {
            state.users.remove(user_id);
            state.purge_owner(&Owner::user(user_id.clone()));
        }
        state.purge_owner(&Owner::organization(id));

        Ok(())
    }

    async fn create_team(&self, mut team: Team) -> Result<Team> {
        let mut state = self.state.write().await;

        if team.id.is_empty() {
            team.id = Uuid::new_v4().to_string();
        }
        if state.teams.contains_key(&team.id) {
            return Err(AuthzError::conflict(format!(
                "team '{}' already exists",
                team.id
            )));
        }
        if !state.organizations.contains_key(&team.organization_id) {
            return Err(AuthzError::not_found(format!(
                "organization '{}'",
                team.organization_id
            )));
        }

        let parent_path = match &team.parent_id {
            Some(parent_id) => {
                let parent = state.teams.get(parent_id).ok_or_else(|| {
                    AuthzError::not_found(format!("team '{}'", parent_id))
                })?;
                if parent.organization_id != team.organization_id {
                    return Err(AuthzError::validation(format!(
                        "parent team '{}' belongs to another organization",
                        parent_id
                    )));
                }
                Some(TeamPath::new(&parent.path)?)
            }
            None => None,
        };

        team.path = TeamPath::for_team(parent_path.as_ref(), &team.id)?
            .as_str()
            .to_string();
        team.users.clear();

        state.teams.insert(team.id.clone(), team.clone());
        Ok(team)
    }

    async fn get_team(&self, id: &str) -> Result<Option<Team>> {
        let state = self.state.read().await;
        Ok(state.teams.get(id).cloned())
    }

    async fn move_team(&self, id: &str, new_parent_id: Option<&str>) -> Result<Team> {
        let mut state = self.state.write().await;

        let team = state
            .teams
            .get(id)
            .ok_or_else(|| AuthzError::not_found(format!("team '{}'", id)))?
            .clone();
        let old_path = TeamPath::new(&team.path)?;

        let new_parent_path = match new_parent_id {
            Some(parent_id) => {
                let parent = state
                    .teams
                    .get(parent_id)
                    .ok_or_else(|| AuthzError::not_found(format!("team '{}'", parent_id)))?;
                if parent.organization_id != team.organization_id {
                    return Err(AuthzError::validation(format!(
                        "team '{}' belongs to another organization",
                        parent_id
                    )));
                }
                let parent_path = TeamPath::new(&parent.path)?;
                if parent_path.is_within(&old_path) {
                    return Err(AuthzError::validation(format!(
                        "cannot move team '{}' under its own descendant '{}'",
                        id, parent_id
                    )));
                }
                Some(parent_path)
            }
            None => None,
        };

        let new_path = TeamPath::for_team(new_parent_path.as_ref(), id)?;

        let subtree = state.subtree_ids(&team.organization_id, &old_path);
        for member_id in subtree {
            let current = TeamPath::new(&state.teams[&member_id].path)?;
            let rebased = current.rebase(&old_path, &new_path)?;
            if let Some(entry) = state.teams.get_mut(&member_id) {
                entry.path = rebased.as_str().to_string();
            }
        }

        let moved = state
            .teams
            .get_mut(id)
            .ok_or_else(|| AuthzError::internal(format!("team '{}' vanished during move", id)))?;
        moved.parent_id = new_parent_id.map(|s| s.to_string());
        Ok(moved.clone())
    }

    async fn delete_team(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let team = state
            .teams
            .get(id)
            .ok_or_else(|| AuthzError::not_found(format!("team '{}'", id)))?
            .clone();
        let path = TeamPath::new(&team.path)?;

        for team_id in state.subtree_ids(&team.organization_id, &path) {
            if let Some(removed) = state.teams.remove(&team_id) {
                for user_id in &removed.users {
                    if let Some(user) = state.users.get_mut(user_id) {
                        user.teams.retain(|t| t != &team_id);
                    }
                }
            }
            state.purge_owner(&Owner::team(team_id));
        }

        Ok(())
    }

    async fn create_user(&self, mut user: User) -> Result<User> {
        let mut state = self.state.write().await;

        if user.id.is_empty() {
            user.id = Uuid::new_v4().to_string();
        }
        if state.users.contains_key(&user.id) {
            return Err(AuthzError::conflict(format!(
                "user '{}' already exists",
                user.id
            )));
        }
        if !state.organizations.contains_key(&user.organization_id) {
            return Err(AuthzError::not_found(format!(
                "organization '{}'",
                user.organization_id
            )));
        }

        user.teams.clear();
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(id).cloned())
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if state.users.remove(id).is_none() {
            return Err(AuthzError::not_found(format!("user '{}'", id)));
        }
        state.forget_member(id);
        state.purge_owner(&Owner::user(id));
        Ok(())
    }

    async fn add_team_member(&self, team_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        let team_org = state
            .teams
            .get(team_id)
            .ok_or_else(|| AuthzError::not_found(format!("team '{}'", team_id)))?
            .organization_id
            .clone();
        let user = state
            .users
            .get(user_id)
            .ok_or_else(|| AuthzError::not_found(format!("user '{}'", user_id)))?;
        if user.organization_id != team_org {
            return Err(AuthzError::validation(format!(
                "user '{}' belongs to another organization",
                user_id
            )));
        }

        if let Some(user) = state.users.get_mut(user_id) {
            if !user.teams.iter().any(|t| t == team_id) {
                user.teams.push(team_id.to_string());
            }
        }
        if let Some(team) = state.teams.get_mut(team_id) {
            if !team.users.iter().any(|u| u == user_id) {
                team.users.push(user_id.to_string());
            }
        }
        Ok(())
    }

    async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.teams.contains_key(team_id) {
            return Err(AuthzError::not_found(format!("team '{}'", team_id)));
        }
        if let Some(team) = state.teams.get_mut(team_id) {
            team.users.retain(|u| u != user_id);
        }
        if let Some(user) = state.users.get_mut(user_id) {
            user.teams.retain(|t| t != team_id);
        }
        Ok(())
    }

    async fn replace_team_members(&self, team_id: &str, user_ids: Vec<String>) -> Result<()> {
        let mut state = self.state.write().await;

        let team_org = state
            .teams
            .get(team_id)
            .ok_or_else(|| AuthzError::not_found(format!("team '{}'", team_id)))?
            .organization_id
            .clone();

        for user_id in &user_ids {
            let user = state
                .users
                .get(user_id)
                .ok_or_else(|| AuthzError::not_found(format!("user '{}'", user_id)))?;
            if user.organization_id != team_org {
                return Err(AuthzError::validation(format!(
                    "user '{}' belongs to another organization",
                    user_id
                )));
            }
        }

        let previous = match state.teams.get_mut(team_id) {
            Some(team) => std::mem::replace(&mut team.users, user_ids.clone()),
            None => Vec::new(),
        };
        for user_id in previous {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.teams.retain(|t| t != team_id);
            }
        }
        for user_id in &user_ids {
            if let Some(user) = state.users.get_mut(user_id) {
                if !user.teams.iter().any(|t| t == team_id) {
                    user.teams.push(team_id.to_string());
                }
            }
        }
        Ok(())
    }

    async fn add_instances(&self, owner: &Owner, instances: Vec<PolicyInstance>) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_owner(owner)?;
        state.push_instances(owner, instances);
        Ok(())
    }

    async fn replace_instances(&self, owner: &Owner, instances: Vec<PolicyInstance>) -> Result<()> {
        let mut state = self.state.write().await;
        state.require_owner(owner)?;
        state.instances.remove(owner);
        state.push_instances(owner, instances);
        Ok(())
    }

    async fn delete_instances(
        &self,
        owner: &Owner,
        policy_id: &str,
        instance_id: Option<&str>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        state.require_owner(owner)?;

        let Some(slot) = state.instances.get_mut(owner) else {
            return Ok(0);
        };
        let before = slot.len();
        slot.retain(|stored| {
            let hit = stored.instance.policy_id == policy_id
                && instance_id
                    .map(|wanted| stored.instance.instance == wanted)
                    .unwrap_or(true);
            !hit
        });
        Ok((before - slot.len()) as u64)
    }

    async fn list_instances(&self, owner: &Owner) -> Result<Vec<PolicyInstance>> {
        let state = self.state.read().await;
        state.require_owner(owner)?;

        Ok(state
            .instances
            .get(owner)
            .map(|slot| slot.iter().map(|s| s.instance.clone()).collect())
            .unwrap_or_default())
    }

    async fn instances_of(&self, policy_id: &str) -> Result<Vec<OwnedInstance>> {
        let state = self.state.read().await;

        let mut found: Vec<(OwnerKind, u64, OwnedInstance)> = Vec::new();
        for (owner, slot) in &state.instances {
            for stored in slot {
                if stored.instance.policy_id == policy_id {
                    found.push((
                        owner.kind,
                        stored.seq,
                        OwnedInstance {
                            owner: owner.clone(),
                            instance: stored.instance.clone(),
                        },
                    ));
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, _, owned)| owned).collect())
    }

    async fn detach_policy(&self, policy_id: &str) -> Result<u64> {
        let mut state = self.state.write().await;

        let mut removed = 0u64;
        for slot in state.instances.values_mut() {
            let before = slot.len();
            slot.retain(|stored| stored.instance.policy_id != policy_id);
            removed += (before - slot.len()) as u64;
        }
        Ok(removed)
    }
}
