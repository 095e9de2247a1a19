//! Error types for strata
//!
//! One error enum for the whole engine. Workers recover locally from
//! `Io` and `Conflict` up to a bounded retry budget; everything else is
//! surfaced to the caller.

use thiserror::Error;

/// Common result type for strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for strata
#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    // Authorization errors
    #[error("insufficient permissions: {0}")]
    Permission(String),

    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token revoked")]
    TokenRevoked,

    #[error("token required")]
    TokenMissing,

    // Concurrency errors
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} aborted")]
    Aborted(String),

    // Data errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {got}")]
    Corruption { expected: String, got: String },

    // Caller errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Invariant violations; logged, never fatal to the process
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn aborted(what: impl Into<String>) -> Self {
        Self::Aborted(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Errors a worker may retry with backoff; everything else is surfaced.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// HTTP status for the external surfaces
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::TokenInvalid | Self::TokenExpired | Self::TokenRevoked | Self::TokenMissing => {
                401
            }
            Self::Permission(_) => 403,
            Self::NotFound(_) => 404,
            Self::AlreadyExists(_) | Self::Conflict(_) => 409,
            Self::Aborted(_) => 410,
            Self::Io(_) | Self::Corruption { .. } | Self::Internal(_) => 500,
        }
    }

    /// Process exit code for control utilities:
    /// 0 success, 1 generic, 2 usage, 3 not-found, 4 permission, 5 exists
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::NotFound(_) => 3,
            Self::Permission(_)
            | Self::TokenInvalid
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::TokenMissing => 4,
            Self::AlreadyExists(_) => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::conflict("busy").is_retryable());
        assert!(Error::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!Error::TokenExpired.is_retryable());
        assert!(!Error::not_found("object").is_retryable());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::Permission("ro bucket".into()).http_status_code(), 403);
        assert_eq!(Error::TokenExpired.http_status_code(), 401);
        assert_eq!(Error::not_found("b/o").http_status_code(), 404);
        assert_eq!(Error::internal("bug").http_status_code(), 500);
    }

    #[test]
    fn test_error_exit_code() {
        assert_eq!(Error::invalid_argument("usage").exit_code(), 2);
        assert_eq!(Error::not_found("x").exit_code(), 3);
        assert_eq!(Error::Permission("denied".into()).exit_code(), 4);
        assert_eq!(Error::AlreadyExists("bucket".into()).exit_code(), 5);
        assert_eq!(Error::internal("x").exit_code(), 1);
    }
}
