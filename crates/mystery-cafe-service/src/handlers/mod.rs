//! API handlers.

pub mod health;
pub mod migrations;
pub mod reservations;
pub mod sync;
