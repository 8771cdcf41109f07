//! Authorization decision engine
//!
//! Folds the aggregated policy instances of a subject into a single
//! access decision. Deny overrides Allow, no match means deny. The
//! superuser overlay and impersonation are explicit steps in front of
//! aggregation, never a rewrite of the aggregated list, so the
//! combination rule stays independent of configuration.

pub mod decision;

pub use decision::{Access, CheckRequest, DecisionHook, ResourceActions};

use crate::aggregator::{AttachedPolicy, PolicyAggregator};
use crate::directory::DirectoryStore;
use crate::error::{AuthzError, Result};
use crate::matcher::{is_literal, Matcher};
use crate::policy::{Effect, PolicyStore};
use crate::template::TemplateResolver;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::OrganizationId;

/// Variable name carrying the subject's user id into templates
const USER_ID_VARIABLE: &str = "udaru.userId";

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Organization whose members hold implicit full access
    pub super_organization: Option<OrganizationId>,
}

/// The authorization decision engine
pub struct AccessEngine {
    directory: Arc<dyn DirectoryStore>,
    aggregator: PolicyAggregator,
    matcher: Matcher,
    resolver: TemplateResolver,
    config: EngineConfig,
    hook: Option<Arc<dyn DecisionHook>>,
}

impl AccessEngine {
    /// Create an engine over the two stores
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn DirectoryStore>,
        policies: Arc<dyn PolicyStore>,
    ) -> Self {
        let aggregator = PolicyAggregator::new(directory.clone(), policies);
        Self {
            directory,
            aggregator,
            matcher: Matcher::new(),
            resolver: TemplateResolver::new(),
            config,
            hook: None,
        }
    }

    /// Install a decision hook
    pub fn with_hook(mut self, hook: Arc<dyn DecisionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Decide whether the subject may perform the requested action
    ///
    /// Refusals come back as `Ok(Access { access: false })`; an `Err`
    /// means the check itself could not be carried out.
    pub async fn is_authorized(&self, request: &CheckRequest) -> Result<Access> {
        let provisional = self.evaluate_request(request).await?;
        let access = self.apply_hook(request, provisional).await?;

        debug!(
            user_id = %request.user_id,
            action = %request.action,
            resource = %request.resource,
            organization_id = %request.organization_id,
            access,
            "access check"
        );
        Ok(Access { access })
    }

    /// Literal actions the subject may perform on a resource
    ///
    /// Wildcard allow patterns are never expanded; any action denied
    /// for the resource is subtracted. The result is sorted.
    pub async fn list_actions(
        &self,
        user_id: &str,
        resource: &str,
        organization_id: &str,
    ) -> Result<Vec<String>> {
        let attached = self.aggregator.collect(user_id, organization_id).await?;
        let context = self.seed_context(user_id, &HashMap::new());
        self.actions_for(&attached, &context, resource)
    }

    /// Allowed actions for several resources, input order preserved
    pub async fn list_actions_multi(
        &self,
        user_id: &str,
        resources: &[String],
        organization_id: &str,
    ) -> Result<Vec<ResourceActions>> {
        let attached = self.aggregator.collect(user_id, organization_id).await?;
        let context = self.seed_context(user_id, &HashMap::new());

        let mut out = Vec::with_capacity(resources.len());
        for resource in resources {
            out.push(ResourceActions {
                resource: resource.clone(),
                actions: self.actions_for(&attached, &context, resource)?,
            });
        }
        Ok(out)
    }

    /// Superuser overlay, impersonation, and the aggregation fold
    async fn evaluate_request(&self, request: &CheckRequest) -> Result<bool> {
        let is_superuser = self.is_superuser(&request.user_id).await?;

        if let Some(target) = &request.impersonate {
            if !is_superuser {
                return Err(AuthzError::forbidden(format!(
                    "user '{}' may not impersonate organization '{}'",
                    request.user_id, target
                )));
            }
            if self.directory.get_organization(target).await?.is_none() {
                return Err(AuthzError::forbidden(format!(
                    "impersonation target organization '{}' does not exist",
                    target
                )));
            }
            info!(
                user_id = %request.user_id,
                target = %target,
                "superuser impersonation"
            );
            // The implicit allow-all stays layered over the target
            // organization's policies, so the outcome is already decided
            return Ok(true);
        }

        if is_superuser {
            return Ok(true);
        }

        let attached = self
            .aggregator
            .collect(&request.user_id, &request.organization_id)
            .await?;
        let context = self.seed_context(&request.user_id, &request.context);
        self.decide(&attached, &context, &request.action, &request.resource)
    }

    /// Whether the user belongs to the configured super organization
    async fn is_superuser(&self, user_id: &str) -> Result<bool> {
        let Some(super_org) = &self.config.super_organization else {
            return Ok(false);
        };
        Ok(self
            .directory
            .get_user(user_id)
            .await?
            .map(|u| &u.organization_id == super_org)
            .unwrap_or(false))
    }

    async fn apply_hook(&self, request: &CheckRequest, provisional: bool) -> Result<bool> {
        let Some(hook) = &self.hook else {
            return Ok(provisional);
        };
        let verdict = hook.on_check(request, provisional).await.map_err(|e| {
            warn!(user_id = %request.user_id, error = %e, "decision hook failed; refusing check");
            AuthzError::hook(e.to_string())
        })?;
        // The hook can veto an allow but never mint one
        Ok(provisional && verdict)
    }

    /// Deny-overrides-Allow fold over the aggregated statements
    fn decide(
        &self,
        attached: &[AttachedPolicy],
        context: &HashMap<String, String>,
        action: &str,
        resource: &str,
    ) -> Result<bool> {
        let mut allowed = false;

        for entry in attached {
            let vars = Self::merge_variables(context, &entry.variables);
            for statement in &entry.policy.statements {
                let actions = self.resolve_all(&statement.actions, &vars);
                if !self.matcher.matches_any(&actions, action)? {
                    continue;
                }
                let resources = self.resolve_all(&statement.resources, &vars);
                if !self.matcher.matches_any(&resources, resource)? {
                    continue;
                }
                match statement.effect {
                    Effect::Deny => return Ok(false),
                    Effect::Allow => allowed = true,
                }
            }
        }

        Ok(allowed)
    }

    /// Allowed literal actions on one resource, denies subtracted
    fn actions_for(
        &self,
        attached: &[AttachedPolicy],
        context: &HashMap<String, String>,
        resource: &str,
    ) -> Result<Vec<String>> {
        let mut allowed: BTreeSet<String> = BTreeSet::new();
        let mut deny_patterns: Vec<String> = Vec::new();

        for entry in attached {
            let vars = Self::merge_variables(context, &entry.variables);
            for statement in &entry.policy.statements {
                let resources = self.resolve_all(&statement.resources, &vars);
                if !self.matcher.matches_any(&resources, resource)? {
                    continue;
                }
                let actions = self.resolve_all(&statement.actions, &vars);
                match statement.effect {
                    Effect::Allow => {
                        allowed.extend(actions.into_iter().filter(|a| is_literal(a)));
                    }
                    Effect::Deny => deny_patterns.extend(actions),
                }
            }
        }

        let mut result = Vec::with_capacity(allowed.len());
        for action in allowed {
            if !self.matcher.matches_any(&deny_patterns, &action)? {
                result.push(action);
            }
        }
        Ok(result)
    }

    fn resolve_all(&self, templates: &[String], vars: &HashMap<String, String>) -> Vec<String> {
        templates
            .iter()
            .map(|t| self.resolver.resolve(t, vars))
            .collect()
    }

    fn seed_context(
        &self,
        user_id: &str,
        request_context: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut context = request_context.clone();
        context.insert(USER_ID_VARIABLE.to_string(), user_id.to_string());
        context
    }

    /// Instance bindings win over request-context bindings
    fn merge_variables(
        context: &HashMap<String, String>,
        instance: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut merged = context.clone();
        for (key, value) in instance {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}
