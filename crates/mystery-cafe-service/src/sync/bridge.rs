//! Realtime sync bridge.
//!
//! Follows row-level change streams for a set of tables and fans each change
//! out to in-process listeners, either registered for one table or for every
//! table. Each subscribed table moves through
//! `unsubscribed -> subscribing -> subscribed`; a failed or closed channel
//! lands in `error` and is not retried.
//!
//! Listeners run synchronously on the table's dispatch task. A listener that
//! returns an error or panics is logged and skipped; the remaining listeners
//! still see the event.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::Instrument;

use mystery_cafe_core::{
    CafeError, ChangeKind, ReservationChange, ReservationId, SubscriptionState, SyncEvent,
    SyncSource, Table,
};
use mystery_cafe_store::{ChangeStream, Store};

use super::webhook::WebhookNotifier;

/// Handle returned by listener registration, used to unregister.
pub type ListenerId = u64;

/// Error a listener may report.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// A change listener.
pub type Listener = Arc<dyn Fn(&SyncEvent) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: ListenerId,
    by_table: HashMap<Table, Vec<(ListenerId, Listener)>>,
    wildcard: Vec<(ListenerId, Listener)>,
}

impl Registry {
    fn allocate(&mut self) -> ListenerId {
        self.next_id += 1;
        self.next_id
    }

    fn for_table(&self, table: Table) -> Vec<(ListenerId, Listener)> {
        self.by_table
            .get(&table)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .cloned()
            .collect()
    }
}

type States = Arc<RwLock<BTreeMap<Table, SubscriptionState>>>;

/// Realtime sync bridge.
pub struct SyncBridge {
    store: Arc<dyn Store>,
    source: SyncSource,
    webhook: Option<Arc<WebhookNotifier>>,
    listeners: Arc<RwLock<Registry>>,
    states: States,
    channels: Mutex<HashMap<Table, JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("source", &self.source)
            .field("webhook", &self.webhook.is_some())
            .field("states", &*self.states.read())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Deliver `event` to every listener registered for its table.
fn dispatch(registry: &RwLock<Registry>, event: &SyncEvent) {
    // Snapshot so listeners may register or unregister while running.
    let listeners = registry.read().for_table(event.table);
    for (id, listener) in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(
                    listener_id = id,
                    table = %event.table,
                    error = %e,
                    "Sync listener failed"
                );
            }
            Err(panic) => {
                tracing::error!(
                    listener_id = id,
                    table = %event.table,
                    panic = %panic_message(panic.as_ref()),
                    "Sync listener panicked"
                );
            }
        }
    }
}

impl SyncBridge {
    /// Create a bridge over `store`. Events are labelled with `source`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        source: SyncSource,
        webhook: Option<Arc<WebhookNotifier>>,
    ) -> Self {
        Self {
            store,
            source,
            webhook,
            listeners: Arc::new(RwLock::new(Registry::default())),
            states: Arc::new(RwLock::new(BTreeMap::new())),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Deployment this bridge labels events with.
    #[must_use]
    pub const fn source(&self) -> SyncSource {
        self.source
    }

    /// Whether outbound reservation notifications are configured.
    #[must_use]
    pub fn has_webhook(&self) -> bool {
        self.webhook.is_some()
    }

    /// Register a listener for one table.
    pub fn on<F>(&self, table: Table, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let mut registry = self.listeners.write();
        let id = registry.allocate();
        registry
            .by_table
            .entry(table)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Register a listener for every table.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let mut registry = self.listeners.write();
        let id = registry.allocate();
        registry.wildcard.push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.listeners.write();
        let before = registry.wildcard.len()
            + registry.by_table.values().map(Vec::len).sum::<usize>();
        registry.wildcard.retain(|(lid, _)| *lid != id);
        for listeners in registry.by_table.values_mut() {
            listeners.retain(|(lid, _)| *lid != id);
        }
        let after = registry.wildcard.len()
            + registry.by_table.values().map(Vec::len).sum::<usize>();
        before != after
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let registry = self.listeners.read();
        registry.wildcard.len() + registry.by_table.values().map(Vec::len).sum::<usize>()
    }

    /// State of one table's subscription.
    #[must_use]
    pub fn state(&self, table: Table) -> SubscriptionState {
        self.states
            .read()
            .get(&table)
            .cloned()
            .unwrap_or(SubscriptionState::Unsubscribed)
    }

    /// State of every table the bridge has tried to follow.
    #[must_use]
    pub fn states(&self) -> BTreeMap<Table, SubscriptionState> {
        self.states.read().clone()
    }

    fn set_state(&self, table: Table, state: SubscriptionState) {
        self.states.write().insert(table, state);
    }

    /// Subscribe to each table in turn.
    ///
    /// Tables already subscribed are left alone. A table whose channel cannot
    /// be opened ends in the error state; the others are still attempted.
    pub async fn start_sync(&self, tables: &[Table]) -> BTreeMap<Table, SubscriptionState> {
        for &table in tables {
            if self.state(table) == SubscriptionState::Subscribed {
                continue;
            }
            self.set_state(table, SubscriptionState::Subscribing);
            tracing::debug!(%table, "Subscribing to changes");

            match self.store.subscribe(table).await {
                Ok(stream) => {
                    self.set_state(table, SubscriptionState::Subscribed);
                    let handle = self.spawn_dispatch(stream);
                    if let Some(previous) = self.channels.lock().insert(table, handle) {
                        previous.abort();
                    }
                    tracing::info!(%table, "Subscribed to changes");
                }
                Err(e) => {
                    tracing::error!(%table, error = %e, "Subscription failed");
                    self.set_state(table, SubscriptionState::Error(e.to_string()));
                }
            }
        }
        self.states()
    }

    fn spawn_dispatch(&self, mut stream: ChangeStream) -> JoinHandle<()> {
        let listeners = Arc::clone(&self.listeners);
        let states = Arc::clone(&self.states);
        let source = self.source;
        let table = stream.table();

        tokio::spawn(
            async move {
                while let Some(change) = stream.recv().await {
                    let event = SyncEvent {
                        table: change.table,
                        kind: change.kind,
                        old_record: change.old,
                        new_record: change.new,
                        timestamp: change.committed_at,
                        source,
                    };
                    dispatch(&listeners, &event);
                }

                let mut states = states.write();
                if states.get(&table) == Some(&SubscriptionState::Subscribed) {
                    tracing::error!(%table, "Change channel closed");
                    states.insert(
                        table,
                        SubscriptionState::Error("change channel closed".to_string()),
                    );
                }
            }
            .in_current_span(),
        )
    }

    /// Tear down every channel and clear all listeners.
    pub fn stop_sync(&self) {
        let channels: Vec<_> = self.channels.lock().drain().collect();
        for (table, handle) in channels {
            handle.abort();
            tracing::debug!(%table, "Unsubscribed from changes");
        }
        {
            let mut states = self.states.write();
            for state in states.values_mut() {
                *state = SubscriptionState::Unsubscribed;
            }
        }
        *self.listeners.write() = Registry::default();
        tracing::info!("Sync stopped");
    }

    /// Fetch the most recently written row of `table` and dispatch it as an
    /// `UPDATE` event. Returns the event, or `None` for an empty table.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the row cannot be read.
    pub async fn manual_sync(&self, table: Table) -> Result<Option<SyncEvent>, CafeError> {
        let Some(row) = self.store.latest_updated_row(table).await? else {
            tracing::debug!(%table, "Manual sync found no rows");
            return Ok(None);
        };

        let event = SyncEvent {
            table,
            kind: ChangeKind::Update,
            old_record: None,
            new_record: Some(row),
            timestamp: Utc::now(),
            source: self.source,
        };
        dispatch(&self.listeners, &event);
        tracing::info!(%table, record_id = ?event.record_id(), "Manual sync dispatched");
        Ok(Some(event))
    }

    /// Send a reservation change to the webhook without waiting for it.
    ///
    /// Delivery failures are logged by the notifier and never reach the
    /// caller. Returns the delivery task, or `None` when no webhook is
    /// configured.
    pub fn notify_reservation_change(
        &self,
        change: ReservationChange,
        reservation_id: ReservationId,
        data: Value,
    ) -> Option<JoinHandle<()>> {
        let Some(webhook) = self.webhook.clone() else {
            tracing::debug!(%reservation_id, %change, "Webhook not configured, skipping");
            return None;
        };
        Some(tokio::spawn(
            async move { webhook.notify(change, reservation_id, data).await }.in_current_span(),
        ))
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        for (_, handle) in self.channels.get_mut().drain() {
            handle.abort();
        }
    }
}
