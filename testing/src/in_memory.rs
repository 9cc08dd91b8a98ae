//! In-memory reservation storage.
//!
//! A complete [`ReservationStore`] and [`AuditLog`] kept behind one
//! `tokio::sync::RwLock`. Every write takes the write lock for its whole
//! check-then-write sequence, so the conflict check and the audit append are
//! atomic with the reservation change.
//!
//! Tests can inject failures and latency to exercise the error and timeout
//! paths of callers.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tablebook_core::BoxFuture;
use tablebook_core::audit::{AuditLogEntry, AuditLogId, AuditRecord};
use tablebook_core::reservation::{Reservation, ReservationDraft, ReservationId};
use tablebook_core::slot::TimeSlot;
use tablebook_core::store::{AuditLog, ReservationStore, StoreError};
use tablebook_core::table::{DiningTable, TableId, TableSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    reservations: BTreeMap<ReservationId, Reservation>,
    logs: Vec<AuditLogEntry>,
    next_reservation_id: i64,
    next_log_id: i64,
}

impl Inner {
    fn taken_tables(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
        requested: &TableSet,
        exclude: Option<ReservationId>,
    ) -> Vec<TableId> {
        let mut taken: Vec<TableId> = self
            .reservations
            .values()
            .filter(|r| Some(r.id) != exclude && r.occupies(date, slot))
            .flat_map(|r| r.tables.intersection(requested))
            .collect();
        taken.sort_unstable();
        taken.dedup();
        taken
    }

    fn append_log(&mut self, reservation_id: ReservationId, record: AuditRecord) {
        self.next_log_id += 1;
        self.logs.push(AuditLogEntry {
            id: AuditLogId::new(self.next_log_id),
            reservation_id,
            record,
        });
    }
}

/// In-memory [`ReservationStore`] + [`AuditLog`].
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use tablebook_testing::InMemoryReservationStore;
///
/// let store = InMemoryReservationStore::with_tables(&[(5, 4), (6, 2)]);
/// assert_eq!(store.table_count(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryReservationStore {
    tables: Arc<Vec<DiningTable>>,
    inner: Arc<RwLock<Inner>>,
    failure: Arc<std::sync::RwLock<Option<StoreError>>>,
    latency: Arc<std::sync::RwLock<Option<Duration>>>,
}

impl InMemoryReservationStore {
    /// Create a store for the given dining room.
    #[must_use]
    pub fn new(mut tables: Vec<DiningTable>) -> Self {
        tables.sort_by_key(|t| t.id);
        tables.dedup_by_key(|t| t.id);
        Self {
            tables: Arc::new(tables),
            inner: Arc::new(RwLock::new(Inner::default())),
            failure: Arc::new(std::sync::RwLock::new(None)),
            latency: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Create a store from `(id, capacity)` pairs.
    #[must_use]
    pub fn with_tables(tables: &[(u32, u32)]) -> Self {
        Self::new(
            tables
                .iter()
                .map(|&(id, capacity)| DiningTable::new(TableId::new(id), capacity))
                .collect(),
        )
    }

    /// Number of tables in the room.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Make every subsequent call fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<StoreError>) {
        if let Ok(mut guard) = self.failure.write() {
            *guard = error;
        }
    }

    /// Delay every subsequent call by `latency` until cleared with `None`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.write() {
            *guard = latency;
        }
    }

    /// Number of stored reservations, active and cancelled.
    pub async fn reservation_count(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    /// Number of stored audit entries.
    pub async fn log_count(&self) -> usize {
        self.inner.read().await.logs.len()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency.read().ok().and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.failure.read().ok().and_then(|guard| guard.clone());
        failure.map_or(Ok(()), Err)
    }

    fn check_tables_exist(&self, requested: &TableSet) -> Result<(), StoreError> {
        requested
            .iter()
            .find(|id| self.tables.binary_search_by_key(id, |t| t.id).is_err())
            .map_or(Ok(()), |id| Err(StoreError::UnknownTable(id)))
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<DiningTable>, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            Ok(self.tables.as_ref().clone())
        })
    }

    fn get_reservation(
        &self,
        id: ReservationId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            Ok(self.inner.read().await.reservations.get(&id).cloned())
        })
    }

    fn active_reservations_at(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        let slot = slot.clone();
        Box::pin(async move {
            self.enter().await?;
            Ok(self
                .inner
                .read()
                .await
                .reservations
                .values()
                .filter(|r| r.occupies(date, &slot))
                .cloned()
                .collect())
        })
    }

    fn reservations_on(
        &self,
        date: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            let mut day: Vec<Reservation> = self
                .inner
                .read()
                .await
                .reservations
                .values()
                .filter(|r| r.date == date)
                .cloned()
                .collect();
            day.sort_by(|a, b| a.time_slot.cmp(&b.time_slot).then(a.id.cmp(&b.id)));
            Ok(day)
        })
    }

    fn insert_reservation(
        &self,
        draft: ReservationDraft,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            self.check_tables_exist(&draft.tables)?;

            let mut inner = self.inner.write().await;
            let taken = inner.taken_tables(draft.date, &draft.time_slot, &draft.tables, None);
            if !taken.is_empty() {
                return Err(StoreError::Conflict { tables: taken });
            }

            inner.next_reservation_id += 1;
            let id = ReservationId::new(inner.next_reservation_id);
            let reservation = Reservation::from_draft(id, draft);
            inner.reservations.insert(id, reservation.clone());
            inner.append_log(id, audit);

            tracing::debug!(reservation_id = %id, "Stored reservation in memory");
            Ok(reservation)
        })
    }

    fn update_reservation(
        &self,
        reservation: Reservation,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            self.check_tables_exist(&reservation.tables)?;

            let mut inner = self.inner.write().await;
            let active = inner
                .reservations
                .get(&reservation.id)
                .is_some_and(Reservation::is_active);
            if !active {
                return Err(StoreError::NotFound(reservation.id));
            }

            let taken = inner.taken_tables(
                reservation.date,
                &reservation.time_slot,
                &reservation.tables,
                Some(reservation.id),
            );
            if !taken.is_empty() {
                return Err(StoreError::Conflict { tables: taken });
            }

            inner
                .reservations
                .insert(reservation.id, reservation.clone());
            inner.append_log(reservation.id, audit);
            Ok(reservation)
        })
    }

    fn cancel_reservation(
        &self,
        id: ReservationId,
        cancelled_at: DateTime<Utc>,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>> {
        Box::pin(async move {
            self.enter().await?;

            let mut inner = self.inner.write().await;
            let cancelled = match inner.reservations.get_mut(&id) {
                Some(reservation) if reservation.is_active() => {
                    reservation.cancelled_at = Some(cancelled_at);
                    reservation.updated_at = cancelled_at;
                    reservation.clone()
                },
                _ => return Err(StoreError::NotFound(id)),
            };
            inner.append_log(id, audit);
            Ok(cancelled)
        })
    }
}

impl AuditLog for InMemoryReservationStore {
    fn entries_for(
        &self,
        reservation_id: ReservationId,
    ) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            Ok(self
                .inner
                .read()
                .await
                .logs
                .iter()
                .filter(|entry| entry.reservation_id == reservation_id)
                .cloned()
                .collect())
        })
    }

    fn recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>> {
        Box::pin(async move {
            self.enter().await?;
            Ok(self
                .inner
                .read()
                .await
                .logs
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .collect())
        })
    }
}
