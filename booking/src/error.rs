//! Booking error taxonomy.

use crate::validation::{ValidationErrors, field};
use tablebook_core::reservation::ReservationId;
use tablebook_core::slot::SlotError;
use tablebook_core::store::StoreError;
use tablebook_core::table::{MAX_TABLES_PER_BOOKING, TableId, TableSetError};
use thiserror::Error;

/// Everything a booking operation can report back to the actor.
///
/// Every variant except [`BookingError::InvalidSlot`] and
/// [`BookingError::StoreFailure`] is user-correctable: the in-progress form
/// stays intact and the actor retries after fixing it. Notification failures
/// never show up here; they are logged by the dispatcher instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// One or more fields are blank or malformed
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A further table was selected while the selection was full
    #[error("At most {max} tables can be selected per booking")]
    SelectionLimitExceeded {
        /// Per-booking table cap
        max: usize,
    },

    /// The booking was submitted without a table
    #[error("Select at least one table")]
    NoTableSelected,

    /// Selected tables were taken by someone else before the commit
    #[error("Tables no longer available for this slot: {}", render_tables(tables))]
    SlotUnavailable {
        /// Tables that are now held by another reservation
        tables: Vec<TableId>,
    },

    /// Date or slot missing, unparseable, or outside the catalog
    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    /// No reservation with that id
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation was cancelled and can no longer be edited
    #[error("Reservation {0} has been cancelled")]
    ReservationCancelled(ReservationId),

    /// The backing store failed or timed out
    #[error("Store failure: {0}")]
    StoreFailure(StoreError),
}

impl BookingError {
    /// Selection cap error with the configured maximum
    #[must_use]
    pub const fn selection_limit() -> Self {
        Self::SelectionLimitExceeded {
            max: MAX_TABLES_PER_BOOKING,
        }
    }

    /// Whether re-issuing the same operation may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreFailure(_))
    }

    /// Whether the actor's view of availability is stale and must be re-resolved
    #[must_use]
    pub const fn requires_refresh(&self) -> bool {
        matches!(self, Self::SlotUnavailable { .. } | Self::StoreFailure(_))
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::SelectionLimitExceeded { .. } => "SELECTION_LIMIT_EXCEEDED",
            Self::NoTableSelected => "NO_TABLE_SELECTED",
            Self::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            Self::InvalidSlot(_) => "INVALID_SLOT",
            Self::ReservationNotFound(_) => "NOT_FOUND",
            Self::ReservationCancelled(_) => "RESERVATION_CANCELLED",
            Self::StoreFailure(_) => "STORE_FAILURE",
        }
    }
}

fn render_tables(tables: &[TableId]) -> String {
    tables
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ValidationErrors> for BookingError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<SlotError> for BookingError {
    fn from(error: SlotError) -> Self {
        Self::InvalidSlot(error.to_string())
    }
}

impl From<TableSetError> for BookingError {
    fn from(error: TableSetError) -> Self {
        match error {
            TableSetError::Empty => Self::NoTableSelected,
            TableSetError::TooMany { .. } => Self::selection_limit(),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { tables } => Self::SlotUnavailable { tables },
            StoreError::NotFound(id) => Self::ReservationNotFound(id),
            StoreError::UnknownTable(table) => Self::Validation(ValidationErrors::single(
                field::TABLE_IDS,
                format!("table {table} does not exist"),
            )),
            other @ (StoreError::Database(_)
            | StoreError::Timeout(_)
            | StoreError::Contended(_)) => Self::StoreFailure(other),
        }
    }
}
