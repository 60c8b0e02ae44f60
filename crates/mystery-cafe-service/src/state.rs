//! Application state.

use std::sync::Arc;

use mystery_cafe_store::{Backend, BackendStatus, Store};

use crate::config::ServiceConfig;
use crate::migration::{FileCache, LocalCache, Migrator};
use crate::reservations::ReservationService;
use crate::sync::{SyncBridge, WebhookNotifier};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// How the backend was resolved at startup.
    pub backend_status: BackendStatus,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Realtime sync bridge.
    pub bridge: Arc<SyncBridge>,

    /// Reservation workflow.
    pub reservations: ReservationService,

    /// Local cache migrator (optional).
    pub migrator: Option<Arc<Migrator>>,

    store: Arc<dyn Store>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend_status", &self.backend_status)
            .field("config", &self.config)
            .field("bridge", &self.bridge)
            .field("migrator", &self.migrator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(backend: Backend, config: ServiceConfig) -> Self {
        if let BackendStatus::Unconfigured(reason) = &backend.status {
            tracing::warn!(%reason, "Backend unavailable - data operations will fail");
        }

        // Create webhook notifier if configured
        let webhook = config.webhook().and_then(|webhook| {
            let url = webhook.url.clone();
            match WebhookNotifier::new(webhook, config.sync_source) {
                Ok(notifier) => {
                    tracing::info!(webhook_url = %url, "Reservation webhook enabled");
                    Some(Arc::new(notifier))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create webhook client");
                    None
                }
            }
        });

        if webhook.is_none() {
            tracing::warn!("Webhook not configured - reservation changes will not be forwarded");
        }

        let store = backend.store;
        let bridge = Arc::new(SyncBridge::new(
            Arc::clone(&store),
            config.sync_source,
            webhook,
        ));
        let reservations = ReservationService::new(
            Arc::clone(&store),
            Arc::clone(&bridge),
            config.business_offset(),
        );

        let mut state = Self {
            backend_status: backend.status,
            config,
            bridge,
            reservations,
            migrator: None,
            store,
        };

        if let Some(path) = state.config.local_cache_path.clone() {
            tracing::info!(path = %path.display(), "Local cache migration enabled");
            state = state.with_cache(Arc::new(FileCache::new(path)));
        }

        state
    }

    /// Use `cache` as the migration source.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.migrator = Some(Arc::new(Migrator::new(Arc::clone(&self.store), cache)));
        self
    }

    /// The storage backend.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Check if a live backend is available.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.backend_status.is_connected()
    }
}
