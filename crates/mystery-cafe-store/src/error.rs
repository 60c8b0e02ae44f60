//! Error types for the storage layer.

use mystery_cafe_core::CafeError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// SQLSTATE class for integrity constraint violations.
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

/// Errors that can occur in storage operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The database call failed (connection, protocol, timeout).
    #[error("database error: {0}")]
    Database(String),

    /// A stored value could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// Identifier that did not resolve.
        id: String,
    },

    /// The database rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// No backend is configured.
    #[error("backend not configured: {0}")]
    Unconfigured(String),
}

impl StoreError {
    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("row", ""),
            sqlx::Error::Database(db) => {
                let is_constraint = db
                    .code()
                    .is_some_and(|code| code.starts_with(INTEGRITY_CONSTRAINT_CLASS));
                if is_constraint {
                    Self::Constraint(db.message().to_string())
                } else {
                    Self::Database(db.message().to_string())
                }
            }
            sqlx::Error::Configuration(e) => Self::Unconfigured(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<StoreError> for CafeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Constraint(msg) => Self::ConstraintViolation(msg),
            StoreError::Unconfigured(msg) => Self::Unconfigured(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Network(msg),
        }
    }
}
