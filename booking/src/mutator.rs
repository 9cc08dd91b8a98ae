//! Reservation create / update / cancel.
//!
//! # Commit protocol
//!
//! Every write follows the same compare-and-commit sequence:
//!
//! 1. Validate the request (contact fields, slot, table count) without I/O
//! 2. Take the in-process lock for each affected (date, slot)
//! 3. Re-read the reservations active at the target slot and reject tables
//!    that are now held by someone else
//! 4. Write the reservation together with its audit record
//!
//! The locks serialize check-then-write within one process. The store's own
//! conditional write covers several processes sharing one database; its
//! conflicts surface as [`BookingError::SlotUnavailable`] just the same.
//! Nothing is written before step 4, so every operation is safe to retry
//! verbatim.

use crate::availability::DEFAULT_STORE_TIMEOUT;
use crate::bounded::store_call;
use crate::error::BookingError;
use crate::notification::NotificationDispatcher;
use crate::validation::{ValidationErrors, field, validate_contact};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tablebook_core::audit::{AuditRecord, ReservationDiff};
use tablebook_core::environment::Clock;
use tablebook_core::reservation::{
    Actor, ContactDetails, Reservation, ReservationDraft, ReservationId,
};
use tablebook_core::slot::{SlotKind, TimeSlot, Venue};
use tablebook_core::store::{ReservationStore, StoreError};
use tablebook_core::table::{TableId, TableSet};
use tablebook_runtime::metrics::ReservationMetrics;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// The full field set of a create or update
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    /// Calendar day
    pub date: NaiveDate,
    /// Reservation slot
    pub time_slot: TimeSlot,
    /// Guest contact fields
    pub contact: ContactDetails,
    /// Selected tables, in selection order
    pub tables: Vec<TableId>,
}

/// Result of an unreserve call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The reservation was active and its tables are now released
    Cancelled(Reservation),
    /// The reservation had already been cancelled; nothing was logged
    AlreadyCancelled(Reservation),
}

impl CancelOutcome {
    /// The reservation in its cancelled state
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Cancelled(reservation) | Self::AlreadyCancelled(reservation) => reservation,
        }
    }
}

type SlotKey = (NaiveDate, TimeSlot);

/// Re-reads allowed while an edited reservation keeps moving under us
const MAX_LOCK_ATTEMPTS: usize = 3;

/// One async mutex per (date, slot), created on demand.
///
/// Entries whose lock nobody holds or waits for are pruned on the next
/// acquisition.
#[derive(Default)]
struct SlotLocks {
    slots: Mutex<HashMap<SlotKey, Weak<Mutex<()>>>>,
}

impl SlotLocks {
    /// Lock every key in `keys`, in sorted order.
    async fn acquire(&self, keys: BTreeSet<SlotKey>) -> Vec<OwnedMutexGuard<()>> {
        let locks: Vec<Arc<Mutex<()>>> = {
            let mut slots = self.slots.lock().await;
            slots.retain(|_, lock| lock.strong_count() > 0);
            keys.into_iter()
                .map(|key| {
                    if let Some(lock) = slots.get(&key).and_then(Weak::upgrade) {
                        return lock;
                    }
                    let lock = Arc::new(Mutex::new(()));
                    slots.insert(key, Arc::downgrade(&lock));
                    lock
                })
                .collect()
        };

        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// A request that passed validation
struct ValidRequest {
    date: NaiveDate,
    time_slot: TimeSlot,
    contact: ContactDetails,
    tables: TableSet,
}

/// Creates, edits and cancels reservations against the shared store.
pub struct ReservationMutator {
    store: Arc<dyn ReservationStore>,
    venue: Arc<Venue>,
    clock: Arc<dyn Clock>,
    notifications: NotificationDispatcher,
    locks: SlotLocks,
    store_timeout: Duration,
}

impl ReservationMutator {
    /// Create a mutator
    #[must_use]
    pub fn new(
        store: Arc<dyn ReservationStore>,
        venue: Arc<Venue>,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            venue,
            clock,
            notifications,
            locks: SlotLocks::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Load a reservation, active or cancelled.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`]: no such reservation
    /// - [`BookingError::StoreFailure`]: the store failed or timed out
    pub async fn load(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        store_call("get_reservation", self.store_timeout, self.store.get_reservation(id))
            .await?
            .ok_or(BookingError::ReservationNotFound(id))
    }

    /// Book the requested tables.
    ///
    /// The confirmation is dispatched after the commit and cannot fail the
    /// booking.
    ///
    /// # Errors
    ///
    /// - [`BookingError::Validation`]: blank or malformed contact fields, or a past slot
    /// - [`BookingError::InvalidSlot`]: slot not in the reservation catalog
    /// - [`BookingError::NoTableSelected`] / [`BookingError::SelectionLimitExceeded`]
    /// - [`BookingError::SlotUnavailable`]: a table was taken before the commit
    /// - [`BookingError::StoreFailure`]: the store failed or timed out
    #[tracing::instrument(skip_all, fields(date = %request.date, slot = %request.time_slot, actor = %actor))]
    pub async fn create(
        &self,
        request: BookingRequest,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let valid = self
            .validate(request, true)
            .inspect_err(|_| ReservationMetrics::record_rejected("create"))?;

        let _guards = self
            .locks
            .acquire(BTreeSet::from([(valid.date, valid.time_slot.clone())]))
            .await;

        self.ensure_free(valid.date, &valid.time_slot, &valid.tables, None, "create")
            .await?;

        let now = self.clock.now();
        let draft = ReservationDraft {
            date: valid.date,
            time_slot: valid.time_slot,
            contact: valid.contact,
            tables: valid.tables,
            created_at: now,
        };
        let preview = Reservation::from_draft(ReservationId::new(0), draft.clone());
        let audit = AuditRecord::created(&preview, actor, now);

        let reservation = store_call(
            "insert_reservation",
            self.store_timeout,
            self.store.insert_reservation(draft, audit),
        )
        .await
        .map_err(|error| commit_error(error, "create"))?;

        ReservationMetrics::record_created();
        tracing::info!(
            reservation_id = %reservation.id,
            tables = %reservation.tables,
            "Reservation created"
        );

        self.notifications.dispatch(reservation.clone());
        Ok(reservation)
    }

    /// Replace the editable fields of an active reservation.
    ///
    /// The audit entry carries only what changed. An update that changes
    /// nothing returns the stored reservation and writes nothing.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`] / [`BookingError::ReservationCancelled`]
    /// - [`BookingError::Validation`]: bad contact fields, or moving into a past slot
    /// - [`BookingError::InvalidSlot`], [`BookingError::NoTableSelected`],
    ///   [`BookingError::SelectionLimitExceeded`]
    /// - [`BookingError::SlotUnavailable`]: a table is held by another reservation
    /// - [`BookingError::StoreFailure`]: the store failed or timed out
    #[tracing::instrument(skip_all, fields(reservation_id = %id, actor = %actor))]
    pub async fn update(
        &self,
        id: ReservationId,
        request: BookingRequest,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let mut baseline = self.load_active(id).await?;

        // The reservation may move between the unlocked read and the lock,
        // so re-read under the lock until both agree.
        let mut attempts = 0;
        let (_guards, baseline) = loop {
            let keys = BTreeSet::from([
                (baseline.date, baseline.time_slot.clone()),
                (request.date, request.time_slot.clone()),
            ]);
            let guards = self.locks.acquire(keys).await;
            let current = self.load_active(id).await?;

            if (current.date, &current.time_slot) == (baseline.date, &baseline.time_slot) {
                break (guards, current);
            }
            attempts += 1;
            if attempts >= MAX_LOCK_ATTEMPTS {
                tracing::warn!(attempts, "Reservation kept moving while being locked");
                return Err(BookingError::StoreFailure(StoreError::Contended(id)));
            }
            baseline = current;
        };

        let moves_slot = baseline.date != request.date || baseline.time_slot != request.time_slot;
        let valid = self
            .validate(request, moves_slot)
            .inspect_err(|_| ReservationMetrics::record_rejected("update"))?;

        let now = self.clock.now();
        let edited = Reservation {
            date: valid.date,
            time_slot: valid.time_slot,
            contact: valid.contact,
            tables: valid.tables,
            updated_at: now,
            ..baseline.clone()
        };

        let diff = ReservationDiff::between(&baseline, &edited);
        if diff.is_empty() {
            tracing::debug!("Update changes nothing");
            return Ok(baseline);
        }

        self.ensure_free(edited.date, &edited.time_slot, &edited.tables, Some(id), "update")
            .await?;

        let audit = AuditRecord::updated(&diff, actor, now);
        let reservation = store_call(
            "update_reservation",
            self.store_timeout,
            self.store.update_reservation(edited, audit),
        )
        .await
        .map_err(|error| commit_error(error, "update"))?;

        ReservationMetrics::record_updated();
        tracing::info!(
            date = ?diff.date.as_ref().map(ToString::to_string),
            time_slot = ?diff.time_slot.as_ref().map(ToString::to_string),
            tables = ?diff.tables.as_ref().map(ToString::to_string),
            contact_fields = diff.contact.len(),
            "Reservation updated"
        );
        Ok(reservation)
    }

    /// Unreserve: release the reservation's tables.
    ///
    /// Cancelling an already-cancelled reservation succeeds without logging
    /// a second entry.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationNotFound`]: no such reservation
    /// - [`BookingError::StoreFailure`]: the store failed or timed out
    #[tracing::instrument(skip_all, fields(reservation_id = %id, actor = %actor))]
    pub async fn cancel(
        &self,
        id: ReservationId,
        actor: Actor,
    ) -> Result<CancelOutcome, BookingError> {
        let existing = self.load(id).await?;
        if !existing.is_active() {
            tracing::debug!("Reservation already cancelled");
            return Ok(CancelOutcome::AlreadyCancelled(existing));
        }

        let _guards = self
            .locks
            .acquire(BTreeSet::from([(existing.date, existing.time_slot.clone())]))
            .await;

        let now = self.clock.now();
        let audit = AuditRecord::cancelled(&existing, actor, now);
        match store_call(
            "cancel_reservation",
            self.store_timeout,
            self.store.cancel_reservation(id, now, audit),
        )
        .await
        {
            Ok(cancelled) => {
                ReservationMetrics::record_cancelled();
                tracing::info!(
                    date = %cancelled.date,
                    time_slot = %cancelled.time_slot,
                    tables = %cancelled.tables,
                    "Reservation cancelled"
                );
                Ok(CancelOutcome::Cancelled(cancelled))
            },
            // Lost a race with another cancel
            Err(StoreError::NotFound(_)) => {
                let current = self.load(id).await?;
                if current.is_active() {
                    Err(BookingError::ReservationNotFound(id))
                } else {
                    Ok(CancelOutcome::AlreadyCancelled(current))
                }
            },
            Err(error) => Err(error.into()),
        }
    }

    async fn load_active(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let reservation = self.load(id).await?;
        if reservation.is_active() {
            Ok(reservation)
        } else {
            Err(BookingError::ReservationCancelled(id))
        }
    }

    /// Field checks that need no I/O.
    ///
    /// Contact and slot problems are reported together; table count is
    /// only checked once the fields are valid.
    fn validate(
        &self,
        request: BookingRequest,
        check_past: bool,
    ) -> Result<ValidRequest, BookingError> {
        let catalog = self.venue.catalog(SlotKind::Reservation);
        if !catalog.contains(&request.time_slot) {
            return Err(BookingError::InvalidSlot(format!(
                "'{}' is not offered for reservations",
                request.time_slot
            )));
        }

        let mut errors = ValidationErrors::new();
        let contact = match validate_contact(&request.contact) {
            Ok(contact) => Some(contact),
            Err(contact_errors) => {
                errors.extend(contact_errors);
                None
            },
        };
        if check_past
            && self
                .venue
                .is_past(request.date, &request.time_slot, self.clock.now())
        {
            errors.push(field::TIME_SLOT, "is in the past");
        }

        let (Some(contact), true) = (contact, errors.is_empty()) else {
            return Err(BookingError::Validation(errors));
        };

        let tables = TableSet::try_from_ids(request.tables)?;

        Ok(ValidRequest {
            date: request.date,
            time_slot: request.time_slot,
            contact,
            tables,
        })
    }

    /// Reject tables held at (`date`, `slot`) by anyone but `owner`.
    async fn ensure_free(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
        tables: &TableSet,
        owner: Option<ReservationId>,
        operation: &'static str,
    ) -> Result<(), BookingError> {
        let active = store_call(
            "active_reservations_at",
            self.store_timeout,
            self.store.active_reservations_at(date, slot),
        )
        .await?;

        let taken: BTreeSet<TableId> = active
            .iter()
            .filter(|reservation| Some(reservation.id) != owner)
            .flat_map(|reservation| tables.intersection(&reservation.tables))
            .collect();

        if taken.is_empty() {
            return Ok(());
        }

        ReservationMetrics::record_conflict(operation);
        tracing::info!(taken = ?taken, "Selected tables are no longer available");
        Err(BookingError::SlotUnavailable {
            tables: taken.into_iter().collect(),
        })
    }
}

/// Map a failed commit, counting store-side conflicts.
fn commit_error(error: StoreError, operation: &'static str) -> BookingError {
    let error = BookingError::from(error);
    if matches!(error, BookingError::SlotUnavailable { .. }) {
        ReservationMetrics::record_conflict(operation);
        tracing::info!(%error, "Store rejected the commit");
    }
    error
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tablebook_core::BoxFuture;
    use tablebook_core::table::DiningTable;
    use tablebook_testing::{InMemoryReservationStore, test_clock};

    /// Reports the reservation alternately at 7:00pm and 7:30pm, as if another
    /// writer kept moving it between reads.
    struct DriftingStore {
        inner: InMemoryReservationStore,
        reads: AtomicUsize,
    }

    impl ReservationStore for DriftingStore {
        fn list_tables(&self) -> BoxFuture<'_, Result<Vec<DiningTable>, StoreError>> {
            self.inner.list_tables()
        }

        fn get_reservation(
            &self,
            id: ReservationId,
        ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
            Box::pin(async move {
                let label = if self.reads.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    "7:00pm"
                } else {
                    "7:30pm"
                };
                let reservation = self.inner.get_reservation(id).await?;
                Ok(reservation.map(|mut reservation| {
                    reservation.time_slot = TimeSlot::parse(label).expect("valid slot");
                    reservation
                }))
            })
        }

        fn active_reservations_at(
            &self,
            date: NaiveDate,
            slot: &TimeSlot,
        ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
            self.inner.active_reservations_at(date, slot)
        }

        fn reservations_on(
            &self,
            date: NaiveDate,
        ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
            self.inner.reservations_on(date)
        }

        fn insert_reservation(
            &self,
            draft: ReservationDraft,
            audit: AuditRecord,
        ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
            self.inner.insert_reservation(draft, audit)
        }

        fn update_reservation(
            &self,
            reservation: Reservation,
            audit: AuditRecord,
        ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
            self.inner.update_reservation(reservation, audit)
        }

        fn cancel_reservation(
            &self,
            id: ReservationId,
            cancelled_at: DateTime<Utc>,
            audit: AuditRecord,
        ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
            self.inner.cancel_reservation(id, cancelled_at, audit)
        }
    }

    fn venue() -> Arc<Venue> {
        Arc::new(
            Venue::new(
                FixedOffset::east_opt(0).expect("valid offset"),
                NaiveTime::from_hms_opt(11, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
            )
            .expect("valid venue"),
        )
    }

    fn mutator(store: Arc<InMemoryReservationStore>) -> ReservationMutator {
        ReservationMutator::new(
            store,
            venue(),
            Arc::new(test_clock()),
            NotificationDispatcher::log_only(),
        )
    }

    fn request(date: (i32, u32, u32), slot: &str, tables: &[u32]) -> BookingRequest {
        BookingRequest {
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid date"),
            time_slot: TimeSlot::parse(slot).expect("valid slot"),
            contact: ContactDetails {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: "+44 20 7946 0018".to_string(),
            },
            tables: tables.iter().copied().map(TableId::new).collect(),
        }
    }

    #[tokio::test]
    async fn slot_locks_are_pruned_once_released() {
        let locks = SlotLocks::default();
        let key = (
            NaiveDate::from_ymd_opt(2025, 6, 10).expect("valid date"),
            TimeSlot::parse("7:00pm").expect("valid slot"),
        );

        let guards = locks.acquire(BTreeSet::from([key.clone()])).await;
        assert_eq!(guards.len(), 1);
        drop(guards);

        let other = (key.0, TimeSlot::parse("7:30pm").expect("valid slot"));
        let _guards = locks.acquire(BTreeSet::from([other])).await;
        assert_eq!(locks.slots.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn past_slot_is_a_time_slot_field_error() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let result = mutator(store)
            .create(request((2025, 5, 31), "7:00pm", &[5]), Actor::User)
            .await;

        assert!(matches!(
            result,
            Err(BookingError::Validation(errors)) if errors.has(field::TIME_SLOT)
        ));
    }

    #[tokio::test]
    async fn contact_errors_come_before_table_checks() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let mut bad = request((2025, 6, 10), "7:00pm", &[]);
        bad.contact.email = "not-an-email".to_string();

        let result = mutator(store).create(bad, Actor::User).await;
        assert!(matches!(
            result,
            Err(BookingError::Validation(errors)) if errors.has(field::EMAIL)
        ));
    }

    #[tokio::test]
    async fn table_count_is_checked() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4), (6, 2), (7, 6)]));
        let mutator = mutator(store);

        assert_eq!(
            mutator.create(request((2025, 6, 10), "7:00pm", &[]), Actor::User).await,
            Err(BookingError::NoTableSelected)
        );
        assert_eq!(
            mutator
                .create(request((2025, 6, 10), "7:00pm", &[5, 6, 7]), Actor::User)
                .await,
            Err(BookingError::selection_limit())
        );
    }

    #[tokio::test]
    async fn slot_outside_catalog_is_invalid() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let result = mutator(store)
            .create(request((2025, 6, 10), "7:15pm", &[5]), Actor::User)
            .await;
        assert!(matches!(result, Err(BookingError::InvalidSlot(_))));
    }

    #[tokio::test]
    async fn unchanged_update_writes_nothing() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let mutator = mutator(Arc::clone(&store));

        let created = mutator
            .create(request((2025, 6, 10), "7:00pm", &[5]), Actor::User)
            .await
            .expect("create succeeds");
        let unchanged = mutator
            .update(created.id, request((2025, 6, 10), "7:00pm", &[5]), Actor::Staff)
            .await
            .expect("update succeeds");

        assert_eq!(unchanged, created);
        assert_eq!(store.log_count().await, 1);
    }

    #[tokio::test]
    async fn cancelled_reservations_cannot_be_edited() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let mutator = mutator(store);

        let created = mutator
            .create(request((2025, 6, 10), "7:00pm", &[5]), Actor::User)
            .await
            .expect("create succeeds");
        mutator.cancel(created.id, Actor::Staff).await.expect("cancel succeeds");

        assert_eq!(
            mutator
                .update(created.id, request((2025, 6, 10), "8:00pm", &[5]), Actor::Staff)
                .await,
            Err(BookingError::ReservationCancelled(created.id))
        );
    }

    #[tokio::test]
    async fn update_gives_up_when_the_reservation_keeps_moving() {
        let inner = InMemoryReservationStore::with_tables(&[(5, 4), (6, 2)]);
        let created = mutator(Arc::new(inner.clone()))
            .create(request((2025, 6, 10), "7:00pm", &[5]), Actor::User)
            .await
            .expect("create succeeds");

        let drifting = Arc::new(DriftingStore {
            inner: inner.clone(),
            reads: AtomicUsize::new(0),
        });
        let mutator = ReservationMutator::new(
            drifting,
            venue(),
            Arc::new(test_clock()),
            NotificationDispatcher::log_only(),
        );

        let result = mutator
            .update(created.id, request((2025, 6, 10), "8:00pm", &[6]), Actor::Staff)
            .await;

        assert_eq!(
            result,
            Err(BookingError::StoreFailure(StoreError::Contended(created.id)))
        );
        assert!(result.expect_err("update fails").is_retryable());
        assert_eq!(inner.log_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_reservation_is_not_found() {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4)]));
        let id = ReservationId::new(404);
        assert_eq!(
            mutator(store).cancel(id, Actor::Staff).await,
            Err(BookingError::ReservationNotFound(id))
        );
    }
}
