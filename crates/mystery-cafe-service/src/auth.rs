//! Admin authentication extractor.
//!
//! Every `/v1` route requires the `X-API-Key` header to match the configured
//! admin key. The acting user for audit rows comes from `X-Actor`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Actor recorded when the request does not name one.
pub const DEFAULT_ACTOR: &str = "admin";

/// An authenticated admin request.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Actor recorded in reservation history.
    pub actor: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(api_key, expected_key) {
            return Err(ApiError::Unauthorized);
        }

        let actor = parts
            .headers
            .get("x-actor")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_ACTOR)
            .to_string();

        Ok(AdminAuth { actor })
    }
}
