//! Error types for the authorization engine
//!
//! One taxonomy for every caller-visible failure. The HTTP layer maps
//! variants to status codes through [`AuthzError::kind`]; storage
//! backends convert their own failures into `Database`.

use thiserror::Error;
use warden_core::CoreError;

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Referenced entity does not exist or is outside the caller's scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input (bad id, bad pattern, cross-organization reference)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation rejected for the authenticated caller
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity with the same id already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Database error: {0}")]
    Database(String),

    /// Decision hook failure; checks fail closed on this
    #[error("Hook error: {0}")]
    Hook(String),

    /// Uncategorized internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error class used for HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Forbidden,
    Conflict,
    Internal,
}

impl AuthzError {
    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AuthzError::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AuthzError::Validation(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        AuthzError::Forbidden(msg.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        AuthzError::Conflict(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        AuthzError::Database(msg.into())
    }

    /// Create a hook error
    pub fn hook<S: Into<String>>(msg: S) -> Self {
        AuthzError::Hook(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        AuthzError::Internal(msg.into())
    }

    /// Returns the coarse class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::NotFound(_) => ErrorKind::NotFound,
            AuthzError::Validation(_) => ErrorKind::Validation,
            AuthzError::Forbidden(_) => ErrorKind::Forbidden,
            AuthzError::Conflict(_) => ErrorKind::Conflict,
            AuthzError::Database(_)
            | AuthzError::Hook(_)
            | AuthzError::Internal(_)
            | AuthzError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<CoreError> for AuthzError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => AuthzError::NotFound(msg),
            CoreError::Validation(msg) => AuthzError::Validation(msg),
            CoreError::Conflict(msg) => AuthzError::Conflict(msg),
            CoreError::Forbidden(msg) => AuthzError::Forbidden(msg),
            CoreError::Database(msg) => AuthzError::Database(msg),
            CoreError::Internal(msg) => AuthzError::Internal(msg),
            CoreError::Io(err) => AuthzError::Io(err),
        }
    }
}

impl From<warden_core::PathError> for AuthzError {
    fn from(err: warden_core::PathError) -> Self {
        AuthzError::Validation(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for AuthzError {
    fn from(err: sqlx::Error) -> Self {
        AuthzError::Database(err.to_string())
    }
}
