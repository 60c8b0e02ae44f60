//! Boundary error types.
//!
//! Every public operation of the cafe backend fails with a [`CafeError`]. The
//! set of kinds is closed on purpose: callers branch on [`ErrorKind`] and show
//! the message, and nothing about the storage backend's own error shape leaks
//! through.

use serde::{Deserialize, Serialize};

use crate::ids::IdError;

/// Result type for cafe operations.
pub type Result<T> = std::result::Result<T, CafeError>;

/// Errors returned across the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CafeError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name (`reservation`, `customer`, ...).
        entity: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    /// Input validation failed or the backend rejected a write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The remote call failed (network, protocol, unexpected response).
    #[error("network error: {0}")]
    Network(String),

    /// Backend credentials are absent or still placeholders.
    #[error("backend not configured: {0}")]
    Unconfigured(String),
}

impl CafeError {
    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The payload-free kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Unconfigured(_) => ErrorKind::Unconfigured,
        }
    }
}

impl From<IdError> for CafeError {
    fn from(err: IdError) -> Self {
        Self::ConstraintViolation(err.to_string())
    }
}

/// Discriminant of [`CafeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`CafeError::NotFound`].
    NotFound,
    /// See [`CafeError::ConstraintViolation`].
    ConstraintViolation,
    /// See [`CafeError::Network`].
    NetworkError,
    /// See [`CafeError::Unconfigured`].
    Unconfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            CafeError::not_found("reservation", "x").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CafeError::Network("timeout".into()).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            CafeError::from(IdError::InvalidUuid).kind(),
            ErrorKind::ConstraintViolation
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CafeError::not_found("customer", "abc");
        assert_eq!(err.to_string(), "customer not found: abc");
    }
}
