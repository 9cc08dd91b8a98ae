//! Dining tables and their per-query availability.
//!
//! A table's *status* is not something the table owns. It is recomputed every
//! time availability is resolved for a (date, slot, viewer) triple, which is why
//! [`DiningTable`] (what the venue has) and [`TableAvailability`] (what one
//! resolution says about it) are separate types.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Maximum number of tables a single reservation may hold.
pub const MAX_TABLES_PER_BOOKING: usize = 2;

/// Unique identifier for a dining table
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(u32);

impl TableId {
    /// Create a `TableId` from its numeric value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A physical table in the dining room
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiningTable {
    /// Table identifier
    pub id: TableId,
    /// Number of seats (always positive)
    pub capacity: u32,
}

impl DiningTable {
    /// Create a new table description
    #[must_use]
    pub const fn new(id: TableId, capacity: u32) -> Self {
        Self { id, capacity }
    }
}

/// Status of a table relative to one (date, slot, viewer) resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    /// Free to be chosen
    Available,
    /// Chosen by the current actor for the in-progress booking
    Selected,
    /// Held by another active reservation at the same date and slot
    Unavailable,
}

impl TableStatus {
    /// Get the wire label for this status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Selected => "selected",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table together with its resolved status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAvailability {
    /// Table identifier
    pub id: TableId,
    /// Number of seats
    pub capacity: u32,
    /// Status for the resolved (date, slot)
    pub status: TableStatus,
}

impl TableAvailability {
    /// Pair a table with a status
    #[must_use]
    pub const fn new(table: DiningTable, status: TableStatus) -> Self {
        Self {
            id: table.id,
            capacity: table.capacity,
            status,
        }
    }
}

/// Errors building a [`TableSet`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableSetError {
    /// No table ids were given
    #[error("At least one table must be selected")]
    Empty,

    /// More ids than a booking may hold
    #[error("A booking may hold at most {max} tables, got {requested}")]
    TooMany {
        /// Number of distinct tables requested
        requested: usize,
        /// The cap
        max: usize,
    },
}

/// Sorted, de-duplicated set of tables assigned to one reservation.
///
/// Holds between one and [`MAX_TABLES_PER_BOOKING`] ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<TableId>", into = "Vec<TableId>")]
pub struct TableSet(SmallVec<[TableId; MAX_TABLES_PER_BOOKING]>);

impl TableSet {
    /// Build a table set from any list of ids.
    ///
    /// Duplicates are collapsed before the size checks.
    ///
    /// # Errors
    ///
    /// Returns [`TableSetError::Empty`] for an empty list and
    /// [`TableSetError::TooMany`] when more than two distinct tables are given.
    pub fn try_from_ids<I>(ids: I) -> Result<Self, TableSetError>
    where
        I: IntoIterator<Item = TableId>,
    {
        let mut ids: Vec<TableId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Err(TableSetError::Empty);
        }
        if ids.len() > MAX_TABLES_PER_BOOKING {
            return Err(TableSetError::TooMany {
                requested: ids.len(),
                max: MAX_TABLES_PER_BOOKING,
            });
        }

        Ok(Self(ids.into_iter().collect()))
    }

    /// Iterate over the ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = TableId> + '_ {
        self.0.iter().copied()
    }

    /// Number of tables in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a table set holds at least one table
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set holds `table`
    #[must_use]
    pub fn contains(&self, table: TableId) -> bool {
        self.0.contains(&table)
    }

    /// Ids present in both sets
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Vec<TableId> {
        self.iter().filter(|id| other.contains(*id)).collect()
    }

    /// Borrow the ids as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[TableId] {
        &self.0
    }
}

impl TryFrom<Vec<TableId>> for TableSet {
    type Error = TableSetError;

    fn try_from(ids: Vec<TableId>) -> Result<Self, Self::Error> {
        Self::try_from_ids(ids)
    }
}

impl From<TableSet> for Vec<TableId> {
    fn from(set: TableSet) -> Self {
        set.0.into_vec()
    }
}

/// Renders as `"5, 6"`, the format used in audit entries.
impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, id) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}
