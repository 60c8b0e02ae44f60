//! Common test utilities for mystery cafe integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use mystery_cafe_core::{CreateReservationRequest, CustomerInput, StoreId, SyncSource};
use mystery_cafe_service::{
    create_router, AppState, LocalCache, ReservationService, ServiceConfig, SyncBridge,
};
use mystery_cafe_store::{Backend, BackendStatus, DisconnectedStore, MemoryStore, Store, StoreError};

/// Admin key the harness configures.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The in-memory backend behind the server.
    pub store: Arc<MemoryStore>,
    /// The admin API key.
    pub admin_key: String,
}

impl TestHarness {
    /// Create a new test harness with an empty in-memory backend.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a harness whose migrator reads from `cache`.
    pub fn with_cache(cache: Arc<dyn LocalCache>) -> Self {
        Self::build(Some(cache))
    }

    fn build(cache: Option<Arc<dyn LocalCache>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let backend = Backend {
            store: store.clone(),
            status: BackendStatus::Connected,
        };

        let mut state = AppState::new(backend, test_config());
        if let Some(cache) = cache {
            state = state.with_cache(cache);
        }
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            admin_key: ADMIN_KEY.to_string(),
        }
    }

    /// A harness with no backend, as when the database URL is a placeholder.
    pub fn unconfigured() -> TestServer {
        let reason = "DATABASE_URL is not set or is a placeholder".to_string();
        let backend = Backend {
            store: Arc::new(DisconnectedStore::new(StoreError::Unconfigured(
                reason.clone(),
            ))),
            status: BackendStatus::Unconfigured(reason),
        };
        let state = AppState::new(backend, test_config());
        TestServer::new(create_router(state)).expect("Failed to create test server")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration used by every harness: UTC+9, no webhook, no cache.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        admin_api_key: Some(ADMIN_KEY.to_string()),
        business_utc_offset_minutes: 540,
        cors_origins: vec!["*".into()],
        ..ServiceConfig::default()
    }
}

/// The cafe's time zone in tests.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("valid offset")
}

/// A business-local wall clock time as UTC.
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    jst()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

/// The store every test books into.
pub fn store_id() -> StoreId {
    StoreId::new("store-shibuya").expect("valid store id")
}

/// A reservation service over a fresh in-memory store, without a webhook.
pub fn service() -> (ReservationService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    let bridge = Arc::new(SyncBridge::new(
        dyn_store.clone(),
        SyncSource::Admin,
        None,
    ));
    (ReservationService::new(dyn_store, bridge, jst()), store)
}

/// The example booking: new customer, 4 players, 3000 each.
pub fn booking(at: DateTime<Utc>) -> CreateReservationRequest {
    CreateReservationRequest::new(
        "The Locked Library",
        store_id(),
        at,
        4,
        CustomerInput {
            name: "Hanako Yamada".into(),
            email: Some("hanako@example.com".into()),
            phone: Some("090-1234-5678".into()),
            notes: None,
        },
        12_000,
    )
}
