//! Realtime sync bridge integration tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_test::traced_test;

use mystery_cafe_core::{ChangeKind, StoreLocation, SubscriptionState, SyncEvent, SyncSource, Table};
use mystery_cafe_service::sync::ListenerError;
use mystery_cafe_service::{ReservationService, SyncBridge};
use mystery_cafe_store::{MemoryStore, Store};

use common::{booking, jst, local};

fn bridge() -> (Arc<SyncBridge>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let bridge = Arc::new(SyncBridge::new(store.clone(), SyncSource::Admin, None));
    (bridge, store)
}

fn collect(bridge: &SyncBridge, table: Option<Table>) -> mpsc::UnboundedReceiver<SyncEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |event: &SyncEvent| -> Result<(), ListenerError> {
        tx.send(event.clone())?;
        Ok(())
    };
    match table {
        Some(table) => bridge.on(table, listener),
        None => bridge.on_any(listener),
    };
    rx
}

async fn next(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event within a second")
        .expect("channel open")
}

fn shibuya() -> serde_json::Value {
    serde_json::to_value(StoreLocation {
        id: "S1".parse().unwrap(),
        name: "Shibuya".into(),
        address: None,
        phone: None,
        is_active: true,
    })
    .unwrap()
}

async fn wait_for_state(bridge: &SyncBridge, table: Table, expected: &SubscriptionState) {
    for _ in 0..100 {
        if bridge.state(table) == *expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{table} never reached {expected:?}, last {:?}", bridge.state(table));
}

#[tokio::test]
async fn writes_reach_listeners_after_start() {
    let (bridge, store) = bridge();
    let mut reservations = collect(&bridge, Some(Table::Reservations));
    let mut everything = collect(&bridge, None);

    let states = bridge
        .start_sync(&[Table::Customers, Table::Reservations])
        .await;
    assert_eq!(states[&Table::Customers], SubscriptionState::Subscribed);
    assert_eq!(states[&Table::Reservations], SubscriptionState::Subscribed);

    let service = ReservationService::new(store.clone(), bridge.clone(), jst());
    let created = service
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let event = next(&mut reservations).await;
    assert_eq!(event.table, Table::Reservations);
    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.source, SyncSource::Admin);
    assert_eq!(event.record_id(), Some(created.id.to_string().as_str()));

    // Tables dispatch on separate tasks, so only the set is stable.
    let mut tables = vec![
        next(&mut everything).await.table,
        next(&mut everything).await.table,
    ];
    tables.sort();
    assert_eq!(tables, vec![Table::Customers, Table::Reservations]);
}

#[tokio::test]
async fn failed_subscription_does_not_stop_the_others() {
    let (bridge, store) = bridge();
    store.fail_table(Table::Staff);

    let states = bridge.start_sync(&[Table::Staff, Table::Stores]).await;

    assert!(matches!(states[&Table::Staff], SubscriptionState::Error(_)));
    assert_eq!(states[&Table::Stores], SubscriptionState::Subscribed);
    assert_eq!(store.subscription_count(Table::Stores), 1);
}

#[tokio::test]
async fn start_is_idempotent_for_subscribed_tables() {
    let (bridge, store) = bridge();

    bridge.start_sync(&[Table::Stores]).await;
    bridge.start_sync(&[Table::Stores]).await;

    assert_eq!(store.subscription_count(Table::Stores), 1);
}

#[tokio::test]
async fn closed_channel_moves_to_error() {
    let (bridge, store) = bridge();
    bridge.start_sync(&[Table::Stores]).await;

    store.close_subscriptions(Table::Stores);

    wait_for_state(
        &bridge,
        Table::Stores,
        &SubscriptionState::Error("change channel closed".into()),
    )
    .await;
}

#[tokio::test]
async fn stop_unsubscribes_and_forgets_listeners() {
    let (bridge, store) = bridge();
    let _rx = collect(&bridge, Some(Table::Stores));
    bridge.start_sync(&[Table::Stores, Table::Scenarios]).await;

    bridge.stop_sync();

    assert_eq!(bridge.listener_count(), 0);
    assert!(bridge
        .states()
        .values()
        .all(|s| *s == SubscriptionState::Unsubscribed));

    for _ in 0..100 {
        if store.subscription_count(Table::Stores) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscription still open after stop");
}

#[tokio::test]
async fn manual_sync_dispatches_latest_row() {
    let (bridge, store) = bridge();
    let mut stores = collect(&bridge, Some(Table::Stores));

    assert!(bridge.manual_sync(Table::Stores).await.unwrap().is_none());

    store.upsert_rows(Table::Stores, &[shibuya()]).await.unwrap();
    let event = bridge.manual_sync(Table::Stores).await.unwrap().unwrap();

    assert_eq!(event.kind, ChangeKind::Update);
    assert_eq!(event.record_id(), Some("S1"));
    assert!(event.old_record.is_none());
    assert_eq!(next(&mut stores).await, event);
}

#[tokio::test]
async fn manual_sync_surfaces_backend_errors() {
    let (bridge, store) = bridge();
    store.fail_table(Table::Stores);

    assert!(bridge.manual_sync(Table::Stores).await.is_err());
}

#[tokio::test]
#[traced_test]
async fn failing_listener_is_logged_and_isolated() {
    let (bridge, store) = bridge();
    bridge.on(Table::Stores, |_event: &SyncEvent| Err("listener broke".into()));
    let mut stores = collect(&bridge, Some(Table::Stores));

    store.upsert_rows(Table::Stores, &[shibuya()]).await.unwrap();
    bridge.manual_sync(Table::Stores).await.unwrap();

    assert_eq!(next(&mut stores).await.record_id(), Some("S1"));
    assert!(logs_contain("Sync listener failed"));
    assert!(logs_contain("listener broke"));
}

#[tokio::test]
async fn no_webhook_means_no_delivery_task() {
    let (bridge, _store) = bridge();
    assert!(!bridge.has_webhook());
    let handle = bridge.notify_reservation_change(
        mystery_cafe_core::ReservationChange::Created,
        mystery_cafe_core::ReservationId::generate(),
        serde_json::json!({}),
    );
    assert!(handle.is_none());
}
