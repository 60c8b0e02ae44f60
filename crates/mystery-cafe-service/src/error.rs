//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use mystery_cafe_core::CafeError;

use crate::migration::MigrationError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name.
        entity: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    /// Bad request - malformed path or query input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The backend rejected the operation (validation or constraint).
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// No backend is configured.
    #[error("backend not configured: {0}")]
    Unconfigured(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                self.to_string(),
                Some(serde_json::json!({ "entity": entity, "id": id })),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::ConstraintViolation(msg) => (
                StatusCode::CONFLICT,
                "constraint_violation",
                msg.clone(),
                None,
            ),
            Self::Network(msg) => {
                tracing::error!(error = %msg, "Backend call failed");
                (StatusCode::BAD_GATEWAY, "network_error", msg.clone(), None)
            }
            Self::Unconfigured(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unconfigured",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CafeError> for ApiError {
    fn from(err: CafeError) -> Self {
        match err {
            CafeError::NotFound { entity, id } => Self::NotFound { entity, id },
            CafeError::ConstraintViolation(msg) => Self::ConstraintViolation(msg),
            CafeError::Network(msg) => Self::Network(msg),
            CafeError::Unconfigured(msg) => Self::Unconfigured(msg),
        }
    }
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Store(e) => e.into(),
            MigrationError::Cache(e) => Self::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cafe_errors_map_to_statuses() {
        let cases = [
            (CafeError::not_found("reservation", "r1"), StatusCode::NOT_FOUND),
            (
                CafeError::ConstraintViolation("dup".into()),
                StatusCode::CONFLICT,
            ),
            (CafeError::Network("reset".into()), StatusCode::BAD_GATEWAY),
            (
                CafeError::Unconfigured("no url".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
