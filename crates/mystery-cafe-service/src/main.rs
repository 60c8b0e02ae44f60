//! Mystery Cafe Service - admin backend for reservations and realtime sync
//!
//! This is the main entry point for the mystery cafe service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mystery_cafe_service::{create_router, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mystery_cafe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mystery Cafe Service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        webhook_configured = %config.webhook_url.is_some(),
        sync_source = %config.sync_source,
        business_offset = %config.business_offset(),
        "Service configuration loaded"
    );

    // Resolve the backend; an unreachable database leaves the service up
    // in the unconfigured state.
    let backend = mystery_cafe_store::connect(
        config.database_url.as_deref(),
        config.database_max_connections,
    )
    .await;

    let state = AppState::new(backend, config.clone());

    if state.is_connected() {
        let states = state.bridge.start_sync(&config.sync_tables).await;
        tracing::info!(tables = states.len(), "Realtime sync started");

        if let Some(migrator) = state.migrator.clone() {
            match migrator.migrate_all().await {
                Ok(reports) => {
                    let migrated: u64 = reports.iter().map(|r| r.migrated).sum();
                    tracing::info!(migrated, "Local cache migration finished");
                }
                Err(e) => tracing::error!(error = %e, "Local cache migration failed"),
            }
        }
    }

    let bridge = state.bridge.clone();
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bridge.stop_sync();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
