//! Slot availability resolution.
//!
//! Availability is a pure function of the active reservations at one
//! (date, slot). Pastness is a pure function of the wall clock. The resolver
//! computes both and reports them side by side; it never hides past slots,
//! callers decide what to disable.

use crate::bounded::store_call;
use crate::error::BookingError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablebook_core::calendar::{self, CalendarDay};
use tablebook_core::environment::Clock;
use tablebook_core::reservation::{Reservation, ReservationId};
use tablebook_core::slot::{SlotKind, TimeSlot, Venue};
use tablebook_core::store::ReservationStore;
use tablebook_core::table::{DiningTable, TableAvailability, TableId, TableStatus};
use tablebook_runtime::metrics::AvailabilityMetrics;

/// Default bound on a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tables with their status at one (date, slot)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Resolved calendar day
    pub date: NaiveDate,
    /// Resolved slot
    pub time_slot: TimeSlot,
    /// Slot starts before now; selection must be disabled
    pub is_past: bool,
    /// Every table, ordered by id
    pub tables: Vec<TableAvailability>,
}

impl Resolution {
    /// Status of one table, if it exists
    #[must_use]
    pub fn status_of(&self, table: TableId) -> Option<TableStatus> {
        self.tables
            .iter()
            .find(|candidate| candidate.id == table)
            .map(|candidate| candidate.status)
    }
}

/// One entry of a slot catalog listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotOption {
    /// The slot
    pub slot: TimeSlot,
    /// Starts before now
    pub is_past: bool,
}

/// Status of every table given the reservations active at one (date, slot).
///
/// The reservation named by `exclude` is ignored, so an actor editing it
/// keeps seeing its own tables as available.
#[must_use]
pub fn table_statuses(
    tables: &[DiningTable],
    active: &[Reservation],
    exclude: Option<ReservationId>,
) -> Vec<TableAvailability> {
    let held: BTreeSet<TableId> = active
        .iter()
        .filter(|reservation| Some(reservation.id) != exclude)
        .flat_map(|reservation| reservation.tables.iter())
        .collect();

    let mut statuses: Vec<TableAvailability> = tables
        .iter()
        .map(|table| {
            let status = if held.contains(&table.id) {
                TableStatus::Unavailable
            } else {
                TableStatus::Available
            };
            TableAvailability::new(*table, status)
        })
        .collect();
    statuses.sort_by_key(|table| table.id);
    statuses
}

/// Computes per-table availability against the shared reservation store.
pub struct AvailabilityResolver {
    store: Arc<dyn ReservationStore>,
    venue: Arc<Venue>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl AvailabilityResolver {
    /// Create a resolver
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, venue: Arc<Venue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            venue,
            clock,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every store call by `timeout`
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The venue whose catalogs and clock are used
    #[must_use]
    pub fn venue(&self) -> &Venue {
        &self.venue
    }

    /// Venue-local date of "now"
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.venue.today(self.clock.now())
    }

    /// Whether (`date`, `slot`) starts before now
    #[must_use]
    pub fn is_past(&self, date: NaiveDate, slot: &TimeSlot) -> bool {
        self.venue.is_past(date, slot, self.clock.now())
    }

    /// Parse a raw (date, slot) pair from a request.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::InvalidSlot`] if either part is missing,
    /// unparseable, or the slot is not in the `kind` catalog.
    pub fn parse_target(
        &self,
        kind: SlotKind,
        date: Option<&str>,
        slot: Option<&str>,
    ) -> Result<(NaiveDate, TimeSlot), BookingError> {
        let date = date
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| BookingError::InvalidSlot("date is required".to_string()))?;
        let date = date
            .parse::<NaiveDate>()
            .map_err(|_| BookingError::InvalidSlot(format!("'{date}' is not a YYYY-MM-DD date")))?;

        let slot = slot
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| BookingError::InvalidSlot("timeSlot is required".to_string()))?;
        let slot = self.venue.catalog(kind).resolve(slot)?;

        Ok((date, slot))
    }

    /// Every table with its status at (`date`, `slot`).
    ///
    /// `exclude` names the reservation being edited; its own assignment never
    /// makes a table unavailable.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidSlot`]: `slot` is not a reservation slot
    /// - [`BookingError::StoreFailure`]: the store failed or timed out
    #[tracing::instrument(skip(self, slot), fields(slot = %slot))]
    pub async fn resolve(
        &self,
        date: NaiveDate,
        slot: &TimeSlot,
        exclude: Option<ReservationId>,
    ) -> Result<Resolution, BookingError> {
        if !self.venue.catalog(SlotKind::Reservation).contains(slot) {
            return Err(BookingError::InvalidSlot(format!(
                "'{slot}' is not offered for reservations"
            )));
        }

        let start = Instant::now();
        let tables = store_call("list_tables", self.store_timeout, self.store.list_tables()).await?;
        let active = store_call(
            "active_reservations_at",
            self.store_timeout,
            self.store.active_reservations_at(date, slot),
        )
        .await?;

        let resolution = Resolution {
            date,
            time_slot: slot.clone(),
            is_past: self.is_past(date, slot),
            tables: table_statuses(&tables, &active, exclude),
        };
        AvailabilityMetrics::record_resolve(start.elapsed());

        tracing::debug!(
            tables = resolution.tables.len(),
            held = active.len(),
            is_past = resolution.is_past,
            "Resolved availability"
        );
        Ok(resolution)
    }

    /// The `kind` catalog with pastness flags for `date`.
    ///
    /// Pick-up slots follow the same past-slot rule as reservation slots.
    #[must_use]
    pub fn slots(&self, kind: SlotKind, date: NaiveDate) -> Vec<SlotOption> {
        let now = self.clock.now();
        self.venue
            .catalog(kind)
            .slots()
            .iter()
            .map(|slot| SlotOption {
                slot: slot.clone(),
                is_past: self.venue.is_past(date, slot, now),
            })
            .collect()
    }

    /// The calendar week containing `anchor` shifted by `shift` weeks.
    ///
    /// Defaults to the current week.
    #[must_use]
    pub fn week(&self, anchor: Option<NaiveDate>, shift: i64) -> Vec<CalendarDay> {
        let today = self.today();
        let anchor = calendar::shift_week(anchor.unwrap_or(today), shift);
        calendar::week_of(anchor, today).to_vec()
    }
}
