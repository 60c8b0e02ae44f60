//! Health check handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use mystery_cafe_core::{SubscriptionState, Table};

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Whether a live backend is available.
    pub connected: bool,
    /// Subscription state per followed table.
    pub sync: BTreeMap<Table, SubscriptionState>,
}

/// Health check endpoint.
///
/// Answers `ok` even without a backend; `connected` tells the two apart.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "mystery-cafe".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected: state.is_connected(),
        sync: state.bridge.states(),
    })
}
