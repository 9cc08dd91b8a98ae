//! Reservations and the actors who make them.

use crate::slot::TimeSlot;
use crate::table::TableSet;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(i64);

impl ReservationId {
    /// Create a `ReservationId` from its numeric value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who performed a booking action (the audit log's `doneBy`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    /// A guest booking for themselves
    #[default]
    User,
    /// Restaurant staff acting on a guest's behalf
    Staff,
}

impl Actor {
    /// Get the wire label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Staff => "staff",
        }
    }

    /// Parse a wire label, case-insensitive
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored lifecycle status.
///
/// Cancellation is not a status; it is recorded as `cancelled_at` on the
/// reservation, which takes it out of the active set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Booked and awaiting the guest
    #[default]
    Pending,
}

impl ReservationStatus {
    /// Get the stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
        }
    }

    /// Parse a stored label
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Guest contact fields
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactDetails {
    /// Guest name
    pub name: String,
    /// Guest email address
    pub email: String,
    /// Guest phone number
    pub phone: String,
}

/// Reservation data before the store assigns an id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationDraft {
    /// Calendar day
    pub date: NaiveDate,
    /// Slot within the day
    pub time_slot: TimeSlot,
    /// Guest contact fields
    pub contact: ContactDetails,
    /// Assigned tables
    pub tables: TableSet,
    /// When the booking was made
    pub created_at: DateTime<Utc>,
}

/// A stored reservation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Calendar day
    pub date: NaiveDate,
    /// Slot within the day
    pub time_slot: TimeSlot,
    /// Guest contact fields
    pub contact: ContactDetails,
    /// Assigned tables
    pub tables: TableSet,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// When the booking was made
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Set once the reservation is cancelled (unreserved)
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Materialise a draft under the id the store assigned
    #[must_use]
    pub fn from_draft(id: ReservationId, draft: ReservationDraft) -> Self {
        Self {
            id,
            date: draft.date,
            time_slot: draft.time_slot,
            contact: draft.contact,
            tables: draft.tables,
            status: ReservationStatus::Pending,
            created_at: draft.created_at,
            updated_at: draft.created_at,
            cancelled_at: None,
        }
    }

    /// Whether the reservation still holds its tables
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }

    /// Whether this reservation holds its tables at (`date`, `slot`)
    #[must_use]
    pub fn occupies(&self, date: NaiveDate, slot: &TimeSlot) -> bool {
        self.is_active() && self.date == date && &self.time_slot == slot
    }
}
