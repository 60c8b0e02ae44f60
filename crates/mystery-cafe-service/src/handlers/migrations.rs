//! Local cache migration handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::migration::{MigrationReport, MigrationStatus, Migrator};
use crate::state::AppState;

fn migrator(state: &AppState) -> Result<&Arc<Migrator>, ApiError> {
    state
        .migrator
        .as_ref()
        .ok_or_else(|| ApiError::Unconfigured("local cache path is not set".into()))
}

/// Completion flags per dataset.
pub async fn migration_status(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Result<Json<MigrationStatus>, ApiError> {
    Ok(Json(migrator(&state)?.status()?))
}

/// Migrate every dataset not yet flagged as done.
pub async fn run_migrations(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<Vec<MigrationReport>>, ApiError> {
    tracing::info!(actor = %auth.actor, "Migration requested");
    let reports = migrator(&state)?.migrate_all().await?;
    Ok(Json(reports))
}

/// Clear the completion flags so the next run copies everything again.
pub async fn reset_migrations(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<MigrationStatus>, ApiError> {
    let migrator = migrator(&state)?;
    migrator.reset()?;
    tracing::info!(actor = %auth.actor, "Migration flags reset");
    Ok(Json(migrator.status()?))
}
