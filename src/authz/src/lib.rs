//! # Warden Authorization
//!
//! Policy-based access control over an organization directory.
//!
//! ## Features
//!
//! - **Directory** of organizations, teams, and users with a
//!   materialized-path team hierarchy
//! - **Versioned policies** of Allow/Deny statements with `${name}`
//!   variable placeholders
//! - **Policy instances** attaching policies to organizations, teams,
//!   or users with per-attachment variable bindings
//! - **Async-first design** using the Tokio runtime
//! - **Pluggable storage**: in-memory stores for embedding and tests,
//!   PostgreSQL stores behind the `postgres` feature
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use warden_authz::{
//!     AccessEngine, CheckRequest, EngineConfig, InMemoryDirectoryStore,
//!     InMemoryPolicyStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = Arc::new(InMemoryDirectoryStore::new());
//!     let policies = Arc::new(InMemoryPolicyStore::new());
//!     let engine = AccessEngine::new(EngineConfig::default(), directory, policies);
//!
//!     let request = CheckRequest {
//!         user_id: "alice".to_string(),
//!         action: "read".to_string(),
//!         resource: "res:db:users".to_string(),
//!         organization_id: "org1".to_string(),
//!         impersonate: None,
//!         context: HashMap::new(),
//!     };
//!
//!     match engine.is_authorized(&request).await {
//!         Ok(access) if access.access => println!("Access granted"),
//!         Ok(_) => println!("Access denied"),
//!         Err(e) => println!("Check failed: {}", e),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod directory;
pub mod engine;
pub mod error;
pub mod instance;
pub mod matcher;
pub mod policy;
pub mod template;

// Re-export commonly used types
pub use aggregator::{AttachedPolicy, PolicyAggregator};
pub use directory::{
    DirectoryStore, InMemoryDirectoryStore, InstanceId, OwnedInstance, Owner, OwnerKind,
    PolicyInstance,
};
pub use engine::decision::{Access, CheckRequest, DecisionHook, ResourceActions};
pub use engine::{AccessEngine, EngineConfig};
pub use error::{AuthzError, ErrorKind, Result};
pub use instance::{AdminUserSpec, InstanceManager};
pub use matcher::Matcher;
pub use policy::{
    Effect, InMemoryPolicyStore, Policy, PolicyId, PolicyRef, PolicyStore, Statement,
};
pub use template::TemplateResolver;

#[cfg(feature = "postgres")]
pub use directory::postgres::PostgresDirectoryStore;
#[cfg(feature = "postgres")]
pub use policy::postgres::PostgresPolicyStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
