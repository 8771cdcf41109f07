//! End-to-end access decision tests over in-memory stores

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use warden_authz::{
    AccessEngine, AuthzError, CheckRequest, DecisionHook, DirectoryStore, Effect, EngineConfig,
    InMemoryDirectoryStore, InMemoryPolicyStore, InstanceManager, Owner, Policy, PolicyRef,
    PolicyStore, Statement,
};
use warden_core::{Organization, Team, User};

const SUPER_ORG: &str = "super-org";

struct Fixture {
    directory: Arc<InMemoryDirectoryStore>,
    policies: Arc<InMemoryPolicyStore>,
    manager: InstanceManager,
    engine: AccessEngine,
}

fn organization(id: &str) -> Organization {
    Organization {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        metadata: HashMap::new(),
        created_at: chrono::Utc::now(),
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
        created_at: chrono::Utc::now(),
    }
}

fn user(id: &str, org_id: &str) -> User {
    User {
        id: id.to_string(),
        organization_id: org_id.to_string(),
        name: id.to_string(),
        teams: vec![],
        metadata: HashMap::new(),
        created_at: chrono::Utc::now(),
    }
}

fn statement(effect: Effect, actions: &[&str], resources: &[&str]) -> Statement {
    Statement {
        effect,
        actions: actions.iter().map(|s| s.to_string()).collect(),
        resources: resources.iter().map(|s| s.to_string()).collect(),
        sid: None,
    }
}

fn policy(id: &str, org: &str, statements: Vec<Statement>) -> Policy {
    Policy {
        id: id.to_string(),
        organization_id: Some(org.to_string()),
        name: id.to_string(),
        version: "1".to_string(),
        statements,
        created_at: chrono::Utc::now(),
    }
}

fn check(user_id: &str, action: &str, resource: &str, org: &str) -> CheckRequest {
    CheckRequest {
        user_id: user_id.to_string(),
        action: action.to_string(),
        resource: resource.to_string(),
        organization_id: org.to_string(),
        impersonate: None,
        context: HashMap::new(),
    }
}

/// org1 with team chain root > mid > leaf, alice in leaf; a separate
/// super organization holding root-user
async fn setup() -> Fixture {
    let directory = Arc::new(InMemoryDirectoryStore::new());
    let policies = Arc::new(InMemoryPolicyStore::new());

    directory
        .create_organization(organization("org1"))
        .await
        .unwrap();
    directory
        .create_organization(organization(SUPER_ORG))
        .await
        .unwrap();

    directory
        .create_team(team("root", "org1", None))
        .await
        .unwrap();
    directory
        .create_team(team("mid", "org1", Some("root")))
        .await
        .unwrap();
    directory
        .create_team(team("leaf", "org1", Some("mid")))
        .await
        .unwrap();

    directory.create_user(user("alice", "org1")).await.unwrap();
    directory
        .create_user(user("root-user", SUPER_ORG))
        .await
        .unwrap();
    directory.add_team_member("leaf", "alice").await.unwrap();

    let manager = InstanceManager::new(directory.clone(), policies.clone());
    let engine = AccessEngine::new(
        EngineConfig {
            super_organization: Some(SUPER_ORG.to_string()),
        },
        directory.clone(),
        policies.clone(),
    );

    Fixture {
        directory,
        policies,
        manager,
        engine,
    }
}

impl Fixture {
    async fn attach(&self, owner: &Owner, policy: Policy) {
        let id = policy.id.clone();
        self.policies.create(policy).await.unwrap();
        self.manager
            .add_instances(owner, &[PolicyRef::Id(id)])
            .await
            .unwrap();
    }

    async fn attach_with_variables(
        &self,
        owner: &Owner,
        policy: Policy,
        variables: HashMap<String, String>,
    ) {
        let id = policy.id.clone();
        self.policies.create(policy).await.unwrap();
        self.manager
            .add_instances(owner, &[PolicyRef::WithVariables { id, variables }])
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_user_with_no_policies_is_denied() {
    let fx = setup().await;

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_organization_allow_reaches_member() {
    let fx = setup().await;
    fx.attach(
        &Owner::organization("org1"),
        policy(
            "p-org",
            "org1",
            vec![statement(Effect::Allow, &["read"], &["res:db:*"])],
        ),
    )
    .await;

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(access.access);

    // Still scoped to the granted action
    let access = fx
        .engine
        .is_authorized(&check("alice", "write", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_ancestor_team_deny_overrides_user_allow() {
    let fx = setup().await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-allow",
            "org1",
            vec![statement(Effect::Allow, &["delete"], &["res:db:users"])],
        ),
    )
    .await;
    fx.attach(
        &Owner::team("root"),
        policy(
            "p-deny",
            "org1",
            vec![statement(Effect::Deny, &["delete"], &["res:db:*"])],
        ),
    )
    .await;

    let access = fx
        .engine
        .is_authorized(&check("alice", "delete", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_instance_variables_gate_resources() {
    let fx = setup().await;
    let region_policy = policy(
        "p-region",
        "org1",
        vec![statement(Effect::Allow, &["read"], &["res:region:${var1}:*"])],
    );
    fx.attach_with_variables(
        &Owner::user("alice"),
        region_policy,
        HashMap::from([("var1".to_string(), "emea".to_string())]),
    )
    .await;

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:region:emea:db", "org1"))
        .await
        .unwrap();
    assert!(access.access);

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:region:apac:db", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_user_id_variable_available_to_statements() {
    let fx = setup().await;
    fx.attach(
        &Owner::organization("org1"),
        policy(
            "p-own",
            "org1",
            vec![statement(
                Effect::Allow,
                &["read"],
                &["res:home:${udaru.userId}"],
            )],
        ),
    )
    .await;

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:home:alice", "org1"))
        .await
        .unwrap();
    assert!(access.access);

    let access = fx
        .engine
        .is_authorized(&check("alice", "read", "res:home:bob", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_superuser_is_allowed_everything() {
    let fx = setup().await;

    let access = fx
        .engine
        .is_authorized(&check(
            "root-user",
            "nuke",
            "res:anything:at:all",
            SUPER_ORG,
        ))
        .await
        .unwrap();
    assert!(access.access);
}

#[tokio::test]
async fn test_impersonation_by_non_superuser_is_forbidden() {
    let fx = setup().await;

    let mut request = check("alice", "read", "res:db:users", "org1");
    request.impersonate = Some("org1".to_string());

    let result = fx.engine.is_authorized(&request).await;
    assert!(matches!(result, Err(AuthzError::Forbidden(_))));
}

#[tokio::test]
async fn test_impersonating_missing_organization_is_forbidden() {
    let fx = setup().await;

    let mut request = check("root-user", "read", "res:db:users", SUPER_ORG);
    request.impersonate = Some("no-such-org".to_string());

    let result = fx.engine.is_authorized(&request).await;
    assert!(matches!(result, Err(AuthzError::Forbidden(_))));
}

#[tokio::test]
async fn test_valid_impersonation_is_allowed() {
    let fx = setup().await;

    let mut request = check("root-user", "read", "res:db:users", SUPER_ORG);
    request.impersonate = Some("org1".to_string());

    let access = fx.engine.is_authorized(&request).await.unwrap();
    assert!(access.access);
}

#[tokio::test]
async fn test_list_actions_subtracts_denies_in_either_order() {
    // Deny above, allow below
    let fx = setup().await;
    fx.attach(
        &Owner::organization("org1"),
        policy(
            "p-deny-org",
            "org1",
            vec![statement(Effect::Deny, &["delete"], &["res:db:users"])],
        ),
    )
    .await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-allow-user",
            "org1",
            vec![statement(
                Effect::Allow,
                &["read", "delete"],
                &["res:db:users"],
            )],
        ),
    )
    .await;

    let actions = fx
        .engine
        .list_actions("alice", "res:db:users", "org1")
        .await
        .unwrap();
    assert_eq!(actions, vec!["read".to_string()]);

    // Allow above, deny below
    let fx = setup().await;
    fx.attach(
        &Owner::organization("org1"),
        policy(
            "p-allow-org",
            "org1",
            vec![statement(
                Effect::Allow,
                &["read", "delete"],
                &["res:db:users"],
            )],
        ),
    )
    .await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-deny-user",
            "org1",
            vec![statement(Effect::Deny, &["delete"], &["res:db:users"])],
        ),
    )
    .await;

    let actions = fx
        .engine
        .list_actions("alice", "res:db:users", "org1")
        .await
        .unwrap();
    assert_eq!(actions, vec!["read".to_string()]);
}

#[tokio::test]
async fn test_list_actions_multi_preserves_input_order() {
    let fx = setup().await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-multi",
            "org1",
            vec![
                statement(Effect::Allow, &["read"], &["res:a"]),
                statement(Effect::Allow, &["write"], &["res:b"]),
            ],
        ),
    )
    .await;

    let resources = vec![
        "res:b".to_string(),
        "res:a".to_string(),
        "res:absent".to_string(),
    ];
    let listed = fx
        .engine
        .list_actions_multi("alice", &resources, "org1")
        .await
        .unwrap();

    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].resource, "res:b");
    assert_eq!(listed[0].actions, vec!["write".to_string()]);
    assert_eq!(listed[1].resource, "res:a");
    assert_eq!(listed[1].actions, vec!["read".to_string()]);
    assert_eq!(listed[2].resource, "res:absent");
    assert!(listed[2].actions.is_empty());
}

#[tokio::test]
async fn test_unknown_user_check_is_not_found() {
    let fx = setup().await;
    let result = fx
        .engine
        .is_authorized(&check("ghost", "read", "res:db:users", "org1"))
        .await;
    assert!(matches!(result, Err(AuthzError::NotFound(_))));
}

struct VetoHook;

#[async_trait]
impl DecisionHook for VetoHook {
    async fn on_check(&self, _request: &CheckRequest, _allow: bool) -> warden_authz::Result<bool> {
        Ok(false)
    }
}

struct ApprovingHook;

#[async_trait]
impl DecisionHook for ApprovingHook {
    async fn on_check(&self, _request: &CheckRequest, _allow: bool) -> warden_authz::Result<bool> {
        Ok(true)
    }
}

struct FailingHook;

#[async_trait]
impl DecisionHook for FailingHook {
    async fn on_check(&self, _request: &CheckRequest, _allow: bool) -> warden_authz::Result<bool> {
        Err(AuthzError::internal("hook backend unreachable"))
    }
}

#[tokio::test]
async fn test_hook_vetoes_allow() {
    let fx = setup().await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-allow",
            "org1",
            vec![statement(Effect::Allow, &["read"], &["res:db:users"])],
        ),
    )
    .await;

    let engine = AccessEngine::new(
        EngineConfig::default(),
        fx.directory.clone(),
        fx.policies.clone(),
    )
    .with_hook(Arc::new(VetoHook));

    let access = engine
        .is_authorized(&check("alice", "read", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_hook_cannot_mint_an_allow() {
    let fx = setup().await;

    let engine = AccessEngine::new(
        EngineConfig::default(),
        fx.directory.clone(),
        fx.policies.clone(),
    )
    .with_hook(Arc::new(ApprovingHook));

    let access = engine
        .is_authorized(&check("alice", "read", "res:db:users", "org1"))
        .await
        .unwrap();
    assert!(!access.access);
}

#[tokio::test]
async fn test_hook_failure_fails_closed() {
    let fx = setup().await;
    fx.attach(
        &Owner::user("alice"),
        policy(
            "p-allow",
            "org1",
            vec![statement(Effect::Allow, &["read"], &["res:db:users"])],
        ),
    )
    .await;

    let engine = AccessEngine::new(
        EngineConfig::default(),
        fx.directory.clone(),
        fx.policies.clone(),
    )
    .with_hook(Arc::new(FailingHook));

    let result = engine
        .is_authorized(&check("alice", "read", "res:db:users", "org1"))
        .await;
    assert!(matches!(result, Err(AuthzError::Hook(_))));
}
