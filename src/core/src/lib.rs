//! # Warden Core
//!
//! Shared types for the Warden access-control service: the directory
//! model (organizations, teams, users), the team hierarchy helpers, and
//! the unified error type used across the workspace.

pub mod error;
pub mod hierarchy;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use hierarchy::{PathError, TeamPath};
pub use types::{Metadata, Organization, OrganizationId, Team, TeamId, User, UserId};
