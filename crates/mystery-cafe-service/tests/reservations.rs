//! Reservation workflow integration tests.

mod common;

use chrono::{Datelike, Duration, NaiveDate, Utc};

use mystery_cafe_core::{
    CafeError, ChangeType, Customer, CustomerInput, CustomerStatus, OptionInput, PageRequest,
    PaymentStatus, ReservationFilters, ReservationId, ReservationPatch, ReservationStatus,
    ScenarioId, Table,
};
use mystery_cafe_store::Store;

use common::{booking, jst, local, service, store_id};

#[tokio::test]
async fn create_prices_and_opens_a_pending_reservation() {
    let (svc, store) = service();

    let detail = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap();
    let r = &detail.reservation;

    assert_eq!(r.final_price, 12_000);
    assert_eq!(r.options_price, 0);
    assert_eq!(r.status, ReservationStatus::Pending);
    assert_eq!(r.payment_status, PaymentStatus::Pending);
    assert_eq!(r.duration_minutes, 60);
    assert!(r.reservation_number.starts_with('R'));

    let customer = detail.customer.as_ref().unwrap();
    assert_eq!(customer.total_visits, 0);
    assert_eq!(customer.total_spent, 0);
    assert!(customer.customer_number.starts_with('C'));
    assert_eq!(r.customer_id, customer.id);
    assert_eq!(r.customer_name, "Hanako Yamada");

    let history = store.list_history(&r.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::StatusChange);
    assert_eq!(history[0].old_value, Some(serde_json::Value::Null));
    assert_eq!(history[0].new_value, Some(serde_json::json!("pending")));
}

#[tokio::test]
async fn options_are_priced_and_stored() {
    let (svc, _store) = service();

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.options = vec![
        OptionInput {
            option_name: "Costume rental".into(),
            price: 500,
            quantity: 4,
        },
        OptionInput {
            option_name: "Photo set".into(),
            price: 1_000,
            quantity: 1,
        },
    ];
    request.discount_amount = 1_000;

    let detail = svc.create_reservation(request).await.unwrap();
    assert_eq!(detail.reservation.options_price, 3_000);
    assert_eq!(detail.reservation.final_price, 14_000);
    assert_eq!(detail.options.len(), 2);

    let fetched = svc.get_reservation(detail.reservation.id).await.unwrap();
    assert_eq!(fetched.options.len(), 2);
    assert_eq!(fetched.customer, detail.customer);
}

#[tokio::test]
async fn invalid_requests_fail_before_any_write() {
    let (svc, store) = service();

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.participant_count = 0;

    let err = svc.create_reservation(request).await.unwrap_err();
    assert!(matches!(err, CafeError::ConstraintViolation(_)));
    let (_, total) = store
        .query_reservations(&ReservationFilters::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn option_totals_out_of_range_are_rejected() {
    let (svc, store) = service();

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.options = vec![OptionInput {
        option_name: "Private room".into(),
        price: i64::MAX / 2 + 1,
        quantity: 2,
    }];

    let err = svc.create_reservation(request).await.unwrap_err();
    assert_eq!(
        err,
        CafeError::ConstraintViolation("price total out of range".into())
    );
    assert_eq!(store.count_rows(Table::Customers).await.unwrap(), 0);
}

#[tokio::test]
async fn rejected_reservation_insert_writes_no_reservation() {
    let (svc, store) = service();
    store.fail_table(Table::Reservations);

    let err = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, CafeError::Network(_)));

    store.restore_table(Table::Reservations);
    let (rows, total) = store
        .query_reservations(&ReservationFilters::default(), 0, 10)
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn failed_option_insert_keeps_the_reservation_without_history() {
    let (svc, store) = service();
    store.fail_table(Table::ReservationOptions);

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.options = vec![OptionInput {
        option_name: "Costume rental".into(),
        price: 500,
        quantity: 4,
    }];
    let err = svc.create_reservation(request).await.unwrap_err();
    assert!(matches!(err, CafeError::Network(_)));

    // No rollback: the reservation row stays behind.
    let (rows, total) = store
        .query_reservations(&ReservationFilters::default(), 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    let id = rows[0].id;
    assert!(store.get_reservation(&id).await.unwrap().is_some());
    assert!(store.list_history(&id).await.unwrap().is_empty());

    store.restore_table(Table::ReservationOptions);
    assert!(store.list_options(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn new_customers_are_numbered_per_day() {
    let (svc, _store) = service();
    let before = Utc::now().with_timezone(&jst()).date_naive();

    let first = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap();
    let mut other = booking(local(2025, 3, 1, 16, 0));
    other.customer = Some(CustomerInput {
        name: "Taro Suzuki".into(),
        email: Some("taro@example.com".into()),
        phone: None,
        notes: None,
    });
    let second = svc.create_reservation(other).await.unwrap();

    let after = Utc::now().with_timezone(&jst()).date_naive();
    let numbers: Vec<_> = [first, second]
        .iter()
        .map(|d| d.customer.as_ref().unwrap().customer_number.clone())
        .collect();
    assert_ne!(numbers[0], numbers[1]);
    for (number, seq) in numbers.iter().zip(["0001", "0002"]) {
        let candidates = [before, after]
            .map(|day| format!("C{}{seq}", day.format("%Y%m%d")));
        assert!(candidates.contains(number), "{number} not in {candidates:?}");
    }
}

#[tokio::test]
async fn customer_numbering_counts_the_business_local_day() {
    let (svc, store) = service();
    let today = Utc::now().with_timezone(&jst()).date_naive();
    let early = local(today.year(), today.month(), today.day(), 0, 30);

    // 00:30 local is the previous UTC day; 23:30 local the night before is
    // the same UTC day as that, but the previous business day.
    let mut counted = Customer::new(CustomerInput::named("Early bird"), "C-seed-1".into());
    counted.created_at = early;
    store.insert_customer(&counted).await.unwrap();
    let mut previous = Customer::new(CustomerInput::named("Night owl"), "C-seed-2".into());
    previous.created_at = early - Duration::hours(1);
    store.insert_customer(&previous).await.unwrap();

    let detail = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap();

    assert_eq!(
        detail.customer.unwrap().customer_number,
        format!("C{}0002", today.format("%Y%m%d"))
    );
}

#[tokio::test]
async fn matching_contact_reuses_the_customer_and_fills_gaps() {
    let (svc, store) = service();

    let mut first = booking(local(2025, 3, 1, 14, 0));
    first.customer = Some(CustomerInput {
        name: "Hanako Yamada".into(),
        email: Some("hanako@example.com".into()),
        phone: None,
        notes: None,
    });
    let first = svc.create_reservation(first).await.unwrap();

    let second = svc
        .create_reservation(booking(local(2025, 3, 2, 14, 0)))
        .await
        .unwrap();

    let customer_id = first.reservation.customer_id;
    assert_eq!(second.reservation.customer_id, customer_id);

    let customer = store.get_customer(&customer_id).await.unwrap().unwrap();
    assert_eq!(customer.phone.as_deref(), Some("090-1234-5678"));
}

#[tokio::test]
async fn blocked_customers_cannot_reserve() {
    let (svc, store) = service();

    let mut customer = Customer::new(CustomerInput::named("Banned"), "C202503010001".into());
    customer.status = CustomerStatus::Blocked;
    store.insert_customer(&customer).await.unwrap();

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.customer = None;
    request.customer_id = Some(customer.id);

    let err = svc.create_reservation(request).await.unwrap_err();
    assert!(matches!(err, CafeError::ConstraintViolation(_)));
}

#[tokio::test]
async fn unknown_customer_id_is_not_found() {
    let (svc, _store) = service();

    let mut request = booking(local(2025, 3, 1, 14, 0));
    request.customer = None;
    request.customer_id = Some(mystery_cafe_core::CustomerId::generate());

    let err = svc.create_reservation(request).await.unwrap_err();
    assert!(matches!(err, CafeError::NotFound { .. }));
}

#[tokio::test]
async fn update_records_one_row_per_changed_field() {
    let (svc, store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let patch = ReservationPatch {
        title: Some("The Locked Library (private)".into()),
        participant_count: Some(4),
        internal_notes: Some("VIP".into()),
        payment_status: Some(PaymentStatus::Paid),
        ..ReservationPatch::default()
    };
    let updated = svc
        .update_reservation(created.id, patch, "manager")
        .await
        .unwrap();

    assert_eq!(updated.title, "The Locked Library (private)");
    assert_eq!(updated.payment_status, PaymentStatus::Paid);

    let history = store.list_history(&created.id).await.unwrap();
    let changes: Vec<_> = history.iter().skip(1).collect();
    assert_eq!(changes.len(), 3);
    assert!(changes
        .iter()
        .all(|h| h.changed_by.as_deref() == Some("manager")));
    assert!(changes
        .iter()
        .any(|h| h.change_type == ChangeType::PaymentChange));
    assert!(!changes
        .iter()
        .any(|h| h.field_name.as_deref() == Some("participant_count")));
}

#[tokio::test]
async fn noop_patch_writes_nothing() {
    let (svc, store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let patch = ReservationPatch {
        title: Some(created.title.clone()),
        ..ReservationPatch::default()
    };
    let unchanged = svc
        .update_reservation(created.id, patch, "manager")
        .await
        .unwrap();

    assert_eq!(unchanged, created);
    assert_eq!(store.list_history(&created.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn discount_change_reprices() {
    let (svc, _store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let patch = ReservationPatch {
        discount_amount: Some(2_000),
        ..ReservationPatch::default()
    };
    let updated = svc
        .update_reservation(created.id, patch, "manager")
        .await
        .unwrap();
    assert_eq!(updated.final_price, 10_000);

    let too_much = ReservationPatch {
        discount_amount: Some(20_000),
        ..ReservationPatch::default()
    };
    let err = svc
        .update_reservation(created.id, too_much, "manager")
        .await
        .unwrap_err();
    assert!(matches!(err, CafeError::ConstraintViolation(_)));
}

#[tokio::test]
async fn cancel_stamps_reason_and_time() {
    let (svc, store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let before = Utc::now();
    let cancelled = svc
        .cancel_reservation(created.id, "customer sick", "front-desk")
        .await
        .unwrap();

    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("customer sick"));
    assert!(cancelled.cancelled_at.is_some_and(|at| at >= before));

    let history = store.list_history(&created.id).await.unwrap();
    let status_rows: Vec<_> = history
        .iter()
        .skip(1)
        .filter(|h| h.change_type == ChangeType::StatusChange)
        .collect();
    assert_eq!(status_rows.len(), 1);
    assert_eq!(status_rows[0].old_value, Some(serde_json::json!("pending")));
    assert_eq!(status_rows[0].new_value, Some(serde_json::json!("cancelled")));
    assert_eq!(status_rows[0].reason.as_deref(), Some("customer sick"));
    assert_eq!(status_rows[0].changed_by.as_deref(), Some("front-desk"));
}

#[tokio::test]
async fn cancel_reads_the_reservation_once() {
    let (svc, store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let before = store.call_count(Table::Reservations);
    svc.cancel_reservation(created.id, "storm", "admin")
        .await
        .unwrap();

    // One read, one write.
    assert_eq!(store.call_count(Table::Reservations) - before, 2);
}

#[tokio::test]
async fn cancel_rules() {
    let (svc, _store) = service();
    let created = svc
        .create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap()
        .reservation;

    let blank = svc.cancel_reservation(created.id, "  ", "admin").await;
    assert!(matches!(blank, Err(CafeError::ConstraintViolation(_))));

    svc.cancel_reservation(created.id, "double booked", "admin")
        .await
        .unwrap();

    let again = svc.cancel_reservation(created.id, "again", "admin").await;
    assert!(matches!(again, Err(CafeError::ConstraintViolation(_))));

    let reopen = ReservationPatch {
        status: Some(ReservationStatus::Confirmed),
        ..ReservationPatch::default()
    };
    let reopened = svc.update_reservation(created.id, reopen, "admin").await;
    assert!(matches!(reopened, Err(CafeError::ConstraintViolation(_))));

    let missing = svc
        .cancel_reservation(ReservationId::generate(), "gone", "admin")
        .await;
    assert!(matches!(missing, Err(CafeError::NotFound { .. })));
}

#[tokio::test]
async fn completion_updates_customer_aggregates() {
    let (svc, store) = service();
    let at = local(2025, 3, 1, 14, 0);
    let created = svc.create_reservation(booking(at)).await.unwrap().reservation;

    for status in [ReservationStatus::Confirmed, ReservationStatus::Completed] {
        let patch = ReservationPatch {
            status: Some(status),
            ..ReservationPatch::default()
        };
        svc.update_reservation(created.id, patch, "admin")
            .await
            .unwrap();
    }

    let customer = store
        .get_customer(&created.customer_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(customer.total_visits, 1);
    assert_eq!(customer.total_spent, 12_000);
    assert_eq!(customer.last_visit_at, Some(at));
}

#[tokio::test]
async fn slots_mark_overlaps_unavailable() {
    let (svc, store) = service();
    let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

    svc.create_reservation(booking(local(2025, 3, 1, 14, 0)))
        .await
        .unwrap();
    let cancelled = svc
        .create_reservation(booking(local(2025, 3, 1, 16, 0)))
        .await
        .unwrap()
        .reservation;
    svc.cancel_reservation(cancelled.id, "no longer needed", "admin")
        .await
        .unwrap();

    let scenario = ScenarioId::new("locked-library").unwrap();
    let before = store.call_count(Table::Reservations);
    let slots = svc
        .get_available_time_slots(&store_id(), date, Some(&scenario))
        .await
        .unwrap();

    assert_eq!(slots.len(), 13);
    assert_eq!(store.call_count(Table::Reservations) - before, 13);
    let unavailable: Vec<_> = slots
        .iter()
        .filter(|s| !s.available)
        .map(|s| s.label.as_str())
        .collect();
    assert_eq!(unavailable, vec!["14:00"]);
    assert!(slots.iter().all(|s| s.scenario_id.as_ref() == Some(&scenario)));
}

#[tokio::test]
async fn listing_is_paginated_newest_first() {
    let (svc, _store) = service();
    for hour in [10, 12, 18] {
        svc.create_reservation(booking(local(2025, 3, 1, hour, 0)))
            .await
            .unwrap();
    }

    let page = svc
        .get_reservations(&ReservationFilters::default(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].requested_datetime, local(2025, 3, 1, 18, 0));

    let second = svc
        .get_reservations(&ReservationFilters::default(), PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].requested_datetime, local(2025, 3, 1, 10, 0));
}

#[tokio::test]
async fn stats_count_statuses_and_revenue() {
    let (svc, _store) = service();
    let mut ids = Vec::new();
    for hour in [10, 14, 14] {
        let mut request = booking(local(2025, 3, 1, hour, 0));
        request.scenario_id = Some(ScenarioId::new("locked-library").unwrap());
        ids.push(svc.create_reservation(request).await.unwrap().reservation.id);
    }

    let confirm = ReservationPatch {
        status: Some(ReservationStatus::Confirmed),
        ..ReservationPatch::default()
    };
    svc.update_reservation(ids[0], confirm, "admin")
        .await
        .unwrap();
    svc.cancel_reservation(ids[1], "weather", "admin")
        .await
        .unwrap();

    let stats = svc
        .get_reservation_stats(Some(store_id()), None, None)
        .await
        .unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total_revenue, 12_000);
    assert!((stats.cancellation_rate - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.popular_scenarios.len(), 1);
    assert_eq!(stats.popular_scenarios[0].count, 2);

    let empty = svc
        .get_reservation_stats(
            None,
            Some(local(2030, 1, 1, 0, 0)),
            Some(local(2030, 1, 2, 0, 0)),
        )
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.cancellation_rate.abs() < f64::EPSILON);
}

#[tokio::test]
async fn history_of_unknown_reservation_is_not_found() {
    let (svc, _store) = service();
    let err = svc
        .get_reservation_history(ReservationId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, CafeError::NotFound { .. }));
}
