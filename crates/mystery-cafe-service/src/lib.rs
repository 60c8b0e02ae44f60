//! Mystery cafe admin backend service.
//!
//! This crate provides the reservation workflow and its HTTP API:
//!
//! - Reservation create, update, cancel, listing, slots and statistics
//! - Realtime change fan-out from backend tables to in-process listeners
//! - Outbound reservation webhook
//! - One-time migration of locally cached admin records
//!
//! # Authentication
//!
//! All `/v1` routes require the `X-API-Key` header to match the configured
//! admin key. `/health` is public.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they don't await

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod reservations;
pub mod routes;
pub mod state;
pub mod sync;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use migration::{FileCache, LocalCache, MemoryCache, MigrationStatus, Migrator};
pub use reservations::{ReservationDetail, ReservationService};
pub use routes::create_router;
pub use state::AppState;
pub use sync::{SyncBridge, WebhookConfig, WebhookNotifier};
