//! Realtime change fan-out and outbound reservation notifications.

pub mod bridge;
pub mod webhook;

pub use bridge::{Listener, ListenerError, ListenerId, SyncBridge};
pub use webhook::{WebhookConfig, WebhookError, WebhookNotifier, WebhookPayload};
