//! Request and response types for authorization checks

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use warden_core::{OrganizationId, UserId};

/// An access check: may `user_id` perform `action` on `resource`?
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Subject of the check
    pub user_id: UserId,

    /// Requested action, matched against statement action patterns
    pub action: String,

    /// Requested resource, matched against statement resource patterns
    pub resource: String,

    /// Organization the check runs in
    pub organization_id: OrganizationId,

    /// Organization to impersonate; superusers only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonate: Option<OrganizationId>,

    /// Request-supplied variable bindings; instance variables of the
    /// same name take precedence
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

/// Result of an access check
///
/// A refused check is a successful call with `access: false`; errors
/// are reserved for invalid input and infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Whether the request is granted
    pub access: bool,
}

/// Allowed actions on a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceActions {
    /// The resource the actions apply to
    pub resource: String,

    /// Literal allowed actions, sorted, denies already subtracted
    pub actions: Vec<String>,
}

/// Inspection hook invoked after every access check
///
/// The hook sees the request and the provisional result and returns
/// its own verdict. A `false` verdict vetoes an allow; a `true`
/// verdict never turns a deny into an allow. Hook failures fail the
/// check closed.
#[async_trait]
pub trait DecisionHook: Send + Sync {
    /// Inspect a provisional decision and return the hook's verdict
    async fn on_check(&self, request: &CheckRequest, allow: bool) -> Result<bool>;
}
