//! End-to-end booking flows against the in-memory store: availability after
//! a booking, commit-time conflicts, cancellation, audit diffs and
//! best-effort notifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tablebook::notification::NotificationDispatcher;
use tablebook::validation::field;
use tablebook::{AvailabilityResolver, BookingError, BookingRequest, CancelOutcome, ReservationMutator};
use tablebook_core::audit::{AuditAction, ContactField};
use tablebook_core::environment::Clock;
use tablebook_core::notification::Notifier;
use tablebook_core::reservation::{Actor, ContactDetails};
use tablebook_core::slot::{TimeSlot, Venue};
use tablebook_core::store::{AuditLog, ReservationStore, StoreError};
use tablebook_core::table::{TableId, TableStatus};
use tablebook_testing::{
    FailingNotifier, HangingNotifier, InMemoryReservationStore, ManualClock, RecordingNotifier,
    test_clock,
};

struct Harness {
    store: InMemoryReservationStore,
    resolver: AvailabilityResolver,
    mutator: Arc<ReservationMutator>,
}

fn venue() -> Arc<Venue> {
    Arc::new(
        Venue::new(
            FixedOffset::east_opt(0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        )
        .unwrap(),
    )
}

fn harness_with(notifier: Arc<dyn Notifier>) -> Harness {
    let store = InMemoryReservationStore::with_tables(&[(5, 4), (6, 2), (7, 6)]);
    let venue = venue();
    let clock = Arc::new(test_clock());
    let shared = Arc::new(store.clone());

    Harness {
        resolver: AvailabilityResolver::new(shared.clone(), Arc::clone(&venue), clock.clone()),
        mutator: Arc::new(ReservationMutator::new(
            shared,
            venue,
            clock,
            NotificationDispatcher::new(notifier, Duration::from_millis(200)),
        )),
        store,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(RecordingNotifier::new()))
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
}

fn seven_pm() -> TimeSlot {
    TimeSlot::parse("7:00pm").unwrap()
}

fn contact() -> ContactDetails {
    ContactDetails {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "555-0100".to_string(),
    }
}

fn request(tables: &[u32]) -> BookingRequest {
    BookingRequest {
        date: date(),
        time_slot: seven_pm(),
        contact: contact(),
        tables: tables.iter().copied().map(TableId::new).collect(),
    }
}

#[tokio::test]
async fn booked_table_becomes_unavailable_and_creation_is_logged() {
    let h = harness();

    let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();

    let resolution = h.resolver.resolve(date(), &seven_pm(), None).await.unwrap();
    assert_eq!(resolution.status_of(TableId::new(5)), Some(TableStatus::Unavailable));
    assert_eq!(resolution.status_of(TableId::new(6)), Some(TableStatus::Available));
    assert_eq!(resolution.status_of(TableId::new(7)), Some(TableStatus::Available));

    let logs = h.store.entries_for(reservation.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].record.action, AuditAction::Created);
    assert_eq!(logs[0].record.tables.as_deref(), Some("5"));
    assert_eq!(logs[0].record.done_by, Actor::User);
}

#[tokio::test]
async fn other_slots_are_unaffected() {
    let h = harness();
    h.mutator.create(request(&[5]), Actor::User).await.unwrap();

    let eight_pm = TimeSlot::parse("8:00pm").unwrap();
    let resolution = h.resolver.resolve(date(), &eight_pm, None).await.unwrap();
    assert!(resolution.tables.iter().all(|t| t.status == TableStatus::Available));
}

#[tokio::test]
async fn a_third_table_is_rejected() {
    let h = harness();

    let result = h.mutator.create(request(&[5, 6, 7]), Actor::Staff).await;

    assert_eq!(result, Err(BookingError::SelectionLimitExceeded { max: 2 }));
    assert_eq!(h.store.reservation_count().await, 0);
}

#[tokio::test]
async fn concurrent_creates_for_one_table_have_one_winner() {
    let h = harness();
    h.store.set_latency(Some(Duration::from_millis(10)));

    let first = {
        let mutator = Arc::clone(&h.mutator);
        tokio::spawn(async move { mutator.create(request(&[5]), Actor::User).await })
    };
    let second = {
        let mutator = Arc::clone(&h.mutator);
        tokio::spawn(async move { mutator.create(request(&[5, 6]), Actor::Staff).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SlotUnavailable { tables }) if tables == &vec![TableId::new(5)]))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.store.reservation_count().await, 1);
    assert_eq!(h.store.log_count().await, 1);
}

#[tokio::test]
async fn concurrent_moves_onto_one_table_have_one_winner() {
    let h = harness();
    let staying = h.mutator.create(request(&[5]), Actor::User).await.unwrap();
    let mut later = request(&[6]);
    later.time_slot = TimeSlot::parse("8:30pm").unwrap();
    let moving = h.mutator.create(later, Actor::User).await.unwrap();
    h.store.set_latency(Some(Duration::from_millis(10)));

    // One changes tables within 7:00pm, the other moves in from 8:30pm
    let first = {
        let mutator = Arc::clone(&h.mutator);
        tokio::spawn(async move { mutator.update(staying.id, request(&[7]), Actor::Staff).await })
    };
    let second = {
        let mutator = Arc::clone(&h.mutator);
        tokio::spawn(async move { mutator.update(moving.id, request(&[7]), Actor::Staff).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::SlotUnavailable { tables }) if tables == &vec![TableId::new(7)]))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 1);

    let updates = h
        .store
        .recent(10)
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.record.action == AuditAction::Updated)
        .count();
    assert_eq!(updates, 1);

    let holders = h
        .store
        .active_reservations_at(date(), &seven_pm())
        .await
        .unwrap()
        .into_iter()
        .filter(|reservation| reservation.tables.contains(TableId::new(7)))
        .count();
    assert_eq!(holders, 1);
}

#[tokio::test]
async fn disjoint_tables_share_a_slot() {
    let h = harness();

    h.mutator.create(request(&[5]), Actor::User).await.unwrap();
    h.mutator.create(request(&[6, 7]), Actor::Staff).await.unwrap();

    let resolution = h.resolver.resolve(date(), &seven_pm(), None).await.unwrap();
    assert!(resolution.tables.iter().all(|t| t.status == TableStatus::Unavailable));
}

#[tokio::test]
async fn cancellation_releases_tables_and_is_idempotent() {
    let h = harness();
    let reservation = h.mutator.create(request(&[5, 6]), Actor::User).await.unwrap();

    let first = h.mutator.cancel(reservation.id, Actor::Staff).await.unwrap();
    assert!(matches!(first, CancelOutcome::Cancelled(ref r) if !r.is_active()));
    assert_eq!(h.store.log_count().await, 2);

    let second = h.mutator.cancel(reservation.id, Actor::Staff).await.unwrap();
    assert!(matches!(second, CancelOutcome::AlreadyCancelled(_)));
    assert_eq!(h.store.log_count().await, 2);

    let resolution = h.resolver.resolve(date(), &seven_pm(), None).await.unwrap();
    assert_eq!(resolution.status_of(TableId::new(5)), Some(TableStatus::Available));

    let logs = h.store.entries_for(reservation.id).await.unwrap();
    assert_eq!(logs[1].record.action, AuditAction::Cancelled);
    assert_eq!(logs[1].record.tables.as_deref(), Some("5, 6"));
    assert_eq!(logs[1].record.done_by, Actor::Staff);

    // Released tables can be booked again
    h.mutator.create(request(&[5]), Actor::User).await.unwrap();
}

#[tokio::test]
async fn cancelling_an_unknown_reservation_is_not_found() {
    let h = harness();
    let result = h
        .mutator
        .cancel(tablebook_core::reservation::ReservationId::new(404), Actor::User)
        .await;
    assert!(matches!(result, Err(BookingError::ReservationNotFound(_))));
}

#[tokio::test]
async fn phone_only_edit_logs_only_the_contact_change() {
    let h = harness();
    let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();

    let mut edit = request(&[5]);
    edit.contact.phone = "555-0199".to_string();
    let updated = h.mutator.update(reservation.id, edit, Actor::Staff).await.unwrap();
    assert_eq!(updated.contact.phone, "555-0199");

    let logs = h.store.entries_for(reservation.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    let record = &logs[1].record;
    assert_eq!(record.action, AuditAction::Updated);
    assert_eq!(record.reservation_date, None);
    assert_eq!(record.time_slot, None);
    assert_eq!(record.tables, None);
    assert_eq!(record.contact_changes, vec![ContactField::Phone]);
}

#[tokio::test]
async fn moving_a_reservation_renders_old_and_new() {
    let h = harness();
    let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();

    let mut edit = request(&[6]);
    edit.time_slot = TimeSlot::parse("8:30pm").unwrap();
    h.mutator.update(reservation.id, edit, Actor::User).await.unwrap();

    let logs = h.store.entries_for(reservation.id).await.unwrap();
    let record = &logs[1].record;
    assert_eq!(record.time_slot.as_deref(), Some("7:00pm → 8:30pm"));
    assert_eq!(record.tables.as_deref(), Some("5 → 6"));
    assert_eq!(record.reservation_date, None);

    let old_slot = h.resolver.resolve(date(), &seven_pm(), None).await.unwrap();
    assert_eq!(old_slot.status_of(TableId::new(5)), Some(TableStatus::Available));
}

#[tokio::test]
async fn editing_keeps_its_own_tables_but_not_others() {
    let h = harness();
    let mine = h.mutator.create(request(&[5]), Actor::User).await.unwrap();
    let theirs = h.mutator.create(request(&[6]), Actor::User).await.unwrap();

    // Growing onto a free table keeps the existing one
    h.mutator.update(mine.id, request(&[5, 7]), Actor::User).await.unwrap();

    // Taking a table held by someone else conflicts and changes nothing
    let result = h.mutator.update(theirs.id, request(&[5]), Actor::User).await;
    assert_eq!(
        result,
        Err(BookingError::SlotUnavailable {
            tables: vec![TableId::new(5)]
        })
    );
    let unchanged = h.mutator.load(theirs.id).await.unwrap();
    assert_eq!(unchanged.tables.as_slice(), &[TableId::new(6)]);

    // Editing, the actor sees its own tables as available
    let view = h.resolver.resolve(date(), &seven_pm(), Some(mine.id)).await.unwrap();
    assert_eq!(view.status_of(TableId::new(5)), Some(TableStatus::Available));
    assert_eq!(view.status_of(TableId::new(6)), Some(TableStatus::Unavailable));
}

#[tokio::test]
async fn cancelled_reservations_cannot_be_edited() {
    let h = harness();
    let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();
    h.mutator.cancel(reservation.id, Actor::User).await.unwrap();

    let result = h.mutator.update(reservation.id, request(&[6]), Actor::User).await;
    assert_eq!(result, Err(BookingError::ReservationCancelled(reservation.id)));
}

#[tokio::test]
async fn past_slots_cannot_be_booked() {
    let h = harness();
    let mut past = request(&[5]);
    past.date = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();

    let result = h.mutator.create(past, Actor::Staff).await;
    assert!(matches!(result, Err(BookingError::Validation(ref errors)) if errors.has(field::TIME_SLOT)));
    assert_eq!(h.store.reservation_count().await, 0);
}

#[tokio::test]
async fn slot_turns_past_without_changing_availability() {
    let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4), (6, 2)]));
    let clock = ManualClock::new(test_clock().now());
    let venue = venue();
    let resolver =
        AvailabilityResolver::new(store.clone(), Arc::clone(&venue), Arc::new(clock.clone()));
    let mutator = ReservationMutator::new(
        store,
        venue,
        Arc::new(clock.clone()),
        NotificationDispatcher::log_only(),
    );
    mutator.create(request(&[5]), Actor::User).await.unwrap();

    let before = resolver.resolve(date(), &seven_pm(), None).await.unwrap();
    assert!(!before.is_past);

    clock.set(Utc.with_ymd_and_hms(2025, 6, 10, 19, 30, 0).unwrap());
    let after = resolver.resolve(date(), &seven_pm(), None).await.unwrap();

    assert!(after.is_past);
    assert_eq!(after.tables, before.tables);
    assert_eq!(after.status_of(TableId::new(5)), Some(TableStatus::Unavailable));
}

#[tokio::test]
async fn confirmations_are_sent_after_commit() {
    let notifier = RecordingNotifier::new();
    let h = harness_with(Arc::new(notifier.clone()));

    let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();

    assert!(notifier.wait_for(1, Duration::from_secs(1)).await);
    assert_eq!(notifier.sent(), vec![reservation.id]);
}

#[tokio::test]
async fn failed_or_hanging_notifications_do_not_roll_back() {
    for notifier in [Arc::new(FailingNotifier) as Arc<dyn Notifier>, Arc::new(HangingNotifier)] {
        let h = harness_with(notifier);

        let reservation = h.mutator.create(request(&[5]), Actor::User).await.unwrap();

        assert!(h.mutator.load(reservation.id).await.unwrap().is_active());
        assert_eq!(h.store.log_count().await, 1);
    }
}

#[tokio::test]
async fn slow_store_surfaces_as_retryable_failure() {
    let store = InMemoryReservationStore::with_tables(&[(5, 4)]);
    store.set_latency(Some(Duration::from_millis(200)));
    let shared = Arc::new(store.clone());
    let mutator = ReservationMutator::new(
        shared,
        venue(),
        Arc::new(test_clock()),
        NotificationDispatcher::log_only(),
    )
    .with_store_timeout(Duration::from_millis(20));

    let error = mutator.create(request(&[5]), Actor::User).await.unwrap_err();

    assert_eq!(error, BookingError::StoreFailure(StoreError::Timeout(20)));
    assert!(error.is_retryable());

    // Retrying verbatim succeeds once the store recovers
    store.set_latency(None);
    mutator.create(request(&[5]), Actor::User).await.unwrap();
}
