//! Realtime sync handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use mystery_cafe_core::{SubscriptionState, SyncEvent, SyncSource, Table};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Sync status response.
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    /// Deployment label on emitted events.
    pub source: SyncSource,
    /// Whether reservation changes are forwarded to a webhook.
    pub webhook_enabled: bool,
    /// Registered listeners.
    pub listeners: usize,
    /// Subscription state per table.
    pub tables: BTreeMap<Table, SubscriptionState>,
}

/// Current subscription states.
pub async fn sync_status(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        source: state.bridge.source(),
        webhook_enabled: state.bridge.has_webhook(),
        listeners: state.bridge.listener_count(),
        tables: state.bridge.states(),
    })
}

/// Manual sync response.
#[derive(Debug, Serialize)]
pub struct ManualSyncResponse {
    /// Table synced.
    pub table: Table,
    /// Dispatched event, absent for an empty table.
    pub event: Option<SyncEvent>,
}

/// Re-dispatch the most recently written row of a table.
pub async fn manual_sync(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(table): Path<String>,
) -> Result<Json<ManualSyncResponse>, ApiError> {
    let table: Table = table.parse().map_err(ApiError::BadRequest)?;
    let event = state.bridge.manual_sync(table).await?;
    Ok(Json(ManualSyncResponse { table, event }))
}
