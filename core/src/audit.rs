//! Append-only audit records for reservation changes.
//!
//! Every create, update and cancel produces exactly one [`AuditRecord`]. The
//! record is handed to the store together with the reservation write so both
//! land in the same atomic unit; once stored it becomes an [`AuditLogEntry`]
//! and is never modified.
//!
//! For updates only what changed is recorded. Date, time slot and table set
//! are rendered `old → new`; changed contact fields are listed by name.

use crate::reservation::{Actor, Reservation, ReservationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arrow used when rendering a change.
pub const CHANGE_ARROW: &str = "→";

/// Unique identifier for an audit log entry (auto-incrementing)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLogId(i64);

impl AuditLogId {
    /// Create an `AuditLogId` from its numeric value
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

impl fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to the reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// Reservation was booked
    Created,
    /// Reservation was edited
    Updated,
    /// Reservation was cancelled and its tables released
    Cancelled,
}

impl AuditAction {
    /// Get the stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stored label
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A guest contact field
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactField {
    /// Guest name
    Name,
    /// Guest email
    Email,
    /// Guest phone
    Phone,
}

impl ContactField {
    /// Get the stored label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    /// Parse a stored label
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            _ => None,
        }
    }
}

/// One changed value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    /// Value before the update
    pub old: String,
    /// Value after the update
    pub new: String,
}

impl FieldChange {
    fn between<T: fmt::Display + PartialEq>(old: &T, new: &T) -> Option<Self> {
        (old != new).then(|| Self {
            old: old.to_string(),
            new: new.to_string(),
        })
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {CHANGE_ARROW} {}", self.old, self.new)
    }
}

/// Differences between the stored reservation and its edited replacement
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationDiff {
    /// Date change, if any
    pub date: Option<FieldChange>,
    /// Time slot change, if any
    pub time_slot: Option<FieldChange>,
    /// Table set change, if any
    pub tables: Option<FieldChange>,
    /// Contact fields whose value changed
    pub contact: Vec<ContactField>,
}

impl ReservationDiff {
    /// Compute the diff from `old` to `new`
    #[must_use]
    pub fn between(old: &Reservation, new: &Reservation) -> Self {
        let mut contact = Vec::new();
        if old.contact.name != new.contact.name {
            contact.push(ContactField::Name);
        }
        if old.contact.email != new.contact.email {
            contact.push(ContactField::Email);
        }
        if old.contact.phone != new.contact.phone {
            contact.push(ContactField::Phone);
        }

        Self {
            date: FieldChange::between(&old.date, &new.date),
            time_slot: FieldChange::between(&old.time_slot, &new.time_slot),
            tables: FieldChange::between(&old.tables, &new.tables),
            contact,
        }
    }

    /// Whether nothing changed at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time_slot.is_none()
            && self.tables.is_none()
            && self.contact.is_empty()
    }

    /// Whether the reservation moves to a different (date, slot)
    #[must_use]
    pub const fn moves_slot(&self) -> bool {
        self.date.is_some() || self.time_slot.is_some()
    }
}

/// An audit record waiting to be stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// What happened
    pub action: AuditAction,
    /// Date, or `old → new` for an update that changed it
    pub reservation_date: Option<String>,
    /// Time slot, or `old → new` for an update that changed it
    pub time_slot: Option<String>,
    /// Table ids, or `old → new` for an update that changed them
    pub tables: Option<String>,
    /// Contact fields an update changed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact_changes: Vec<ContactField>,
    /// Actor class
    pub done_by: Actor,
    /// When the change was committed
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Record for a freshly booked reservation
    #[must_use]
    pub fn created(reservation: &Reservation, done_by: Actor, recorded_at: DateTime<Utc>) -> Self {
        Self::snapshot(AuditAction::Created, reservation, done_by, recorded_at)
    }

    /// Record for an edit, carrying only what changed
    #[must_use]
    pub fn updated(diff: &ReservationDiff, done_by: Actor, recorded_at: DateTime<Utc>) -> Self {
        Self {
            action: AuditAction::Updated,
            reservation_date: diff.date.as_ref().map(ToString::to_string),
            time_slot: diff.time_slot.as_ref().map(ToString::to_string),
            tables: diff.tables.as_ref().map(ToString::to_string),
            contact_changes: diff.contact.clone(),
            done_by,
            recorded_at,
        }
    }

    /// Record for a cancellation, naming what was released
    #[must_use]
    pub fn cancelled(
        reservation: &Reservation,
        done_by: Actor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self::snapshot(AuditAction::Cancelled, reservation, done_by, recorded_at)
    }

    fn snapshot(
        action: AuditAction,
        reservation: &Reservation,
        done_by: Actor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            reservation_date: Some(reservation.date.to_string()),
            time_slot: Some(reservation.time_slot.to_string()),
            tables: Some(reservation.tables.to_string()),
            contact_changes: Vec::new(),
            done_by,
            recorded_at,
        }
    }
}

/// A stored, immutable audit entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Entry identifier
    pub id: AuditLogId,
    /// Reservation the entry is about
    pub reservation_id: ReservationId,
    /// The recorded change
    #[serde(flatten)]
    pub record: AuditRecord,
}
