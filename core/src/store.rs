//! Persistence seams for reservations and their audit trail.
//!
//! # Implementations
//!
//! - `PostgresReservationStore` (in `tablebook-postgres`): production storage
//! - `InMemoryReservationStore` (in `tablebook-testing`): fast, deterministic tests
//!   and single-process deployments
//!
//! # Atomicity
//!
//! Each write takes the [`AuditRecord`] describing it and must persist both in
//! one atomic unit: either the reservation change and its audit entry are
//! stored, or neither is.
//!
//! Writes also enforce the table invariant themselves. No two active
//! reservations at the same (date, slot) may share a table; a write that would
//! break this fails with [`StoreError::Conflict`]. Callers pre-check
//! availability for friendly errors, but the store's conditional write is the
//! authority.
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures so the traits can be used as
//! `Arc<dyn ReservationStore>` from effects and HTTP handlers.

use crate::BoxFuture;
use crate::audit::{AuditLogEntry, AuditRecord};
use crate::reservation::{Reservation, ReservationDraft, ReservationId};
use crate::slot::TimeSlot;
use crate::table::{DiningTable, TableId};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another active reservation at the same (date, slot) holds these tables.
    #[error("Tables already reserved for this slot: {}", format_tables(tables))]
    Conflict {
        /// Tables that are taken
        tables: Vec<TableId>,
    },

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    NotFound(ReservationId),

    /// A referenced table does not exist.
    #[error("Unknown table: {0}")]
    UnknownTable(TableId),

    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// The store did not answer in time.
    #[error("Store operation timed out after {0} ms")]
    Timeout(u64),

    /// The reservation kept changing while a writer tried to lock it.
    #[error("Reservation {0} changed concurrently, retry")]
    Contended(ReservationId),
}

fn format_tables(tables: &[TableId]) -> String {
    tables
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reservation storage.
///
/// Implementations must be `Send + Sync`; the same store is shared by every
/// concurrent request.
pub trait ReservationStore: Send + Sync {
    /// All tables in the dining room, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn list_tables(&self) -> BoxFuture<'_, Result<Vec<DiningTable>, StoreError>>;

    /// Load one reservation, active or cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn get_reservation(
        &self,
        id: ReservationId,
    ) -> BoxFuture<'_, Result<Option<Reservation>, StoreError>>;

    /// Active reservations holding tables at exactly (`date`, `slot`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn active_reservations_at(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
    ) -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>>;

    /// Every reservation on `date`, active and cancelled, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn reservations_on(&self, date: NaiveDate)
    -> BoxFuture<'_, Result<Vec<Reservation>, StoreError>>;

    /// Store a new reservation and its `created` audit record.
    ///
    /// The audit record's reservation id is assigned by the store.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a requested table is already held at that (date, slot)
    /// - `UnknownTable`: a requested table does not exist
    /// - `Database`: the write failed
    fn insert_reservation(
        &self,
        draft: ReservationDraft,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>>;

    /// Replace an active reservation with its edited version and store the
    /// `updated` audit record.
    ///
    /// The reservation's own prior assignment never conflicts with itself.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no active reservation with that id
    /// - `Conflict`: a requested table is held by another reservation
    /// - `UnknownTable`: a requested table does not exist
    /// - `Database`: the write failed
    fn update_reservation(
        &self,
        reservation: Reservation,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>>;

    /// Mark a reservation inactive, releasing its tables, and store the
    /// `cancelled` audit record.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no active reservation with that id
    /// - `Database`: the write failed
    fn cancel_reservation(
        &self,
        id: ReservationId,
        cancelled_at: DateTime<Utc>,
        audit: AuditRecord,
    ) -> BoxFuture<'_, Result<Reservation, StoreError>>;
}

/// Read access to the append-only audit trail.
pub trait AuditLog: Send + Sync {
    /// Entries about one reservation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn entries_for(
        &self,
        reservation_id: ReservationId,
    ) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>>;

    /// The most recent entries across all reservations, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<AuditLogEntry>, StoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_lists_tables() {
        let err = StoreError::Conflict {
            tables: vec![TableId::new(5), TableId::new(6)],
        };
        assert_eq!(err.to_string(), "Tables already reserved for this slot: 5, 6");
    }

    #[test]
    fn store_traits_are_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn ReservationStore>, _: Option<&dyn AuditLog>) {}
        assert_dyn(None, None);
    }
}
