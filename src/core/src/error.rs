//! Unified error type for the Warden directory model
//!
//! Storage backends and the authorization engine convert their own
//! failures into these variants so callers see one taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for the Warden directory model
#[derive(Debug, Error)]
pub enum CoreError {
    /// Referenced entity does not exist or is outside the caller's scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity with the same id already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Mutation rejected for the authenticated caller
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(String),

    /// Uncategorized internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        CoreError::Validation(msg.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        CoreError::Conflict(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        CoreError::Forbidden(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        CoreError::Database(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        CoreError::Internal(msg.into())
    }
}
