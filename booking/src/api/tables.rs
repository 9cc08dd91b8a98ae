//! Availability and catalog queries.
//!
//! - GET /api/tables?date=&timeSlot=&reservationId= - table statuses at one slot
//! - GET /api/slots?kind=&date= - a slot catalog with pastness flags
//! - GET /api/calendar?anchor=&shift= - one calendar week

use super::error::AppError;
use crate::availability::{Resolution, SlotOption};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tablebook_core::calendar::CalendarDay;
use tablebook_core::reservation::ReservationId;
use tablebook_core::slot::SlotKind;

/// Query for table availability.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablesQuery {
    /// Calendar day, `YYYY-MM-DD`
    pub date: Option<String>,
    /// Reservation slot label
    pub time_slot: Option<String>,
    /// Reservation being edited; its own tables stay available
    pub reservation_id: Option<i64>,
}

/// Every table with its status at (date, timeSlot).
///
/// # Example
///
/// ```bash
/// curl 'http://localhost:8080/api/tables?date=2025-06-10&timeSlot=7:00pm'
/// ```
///
/// Response:
/// ```json
/// {
///   "date": "2025-06-10",
///   "timeSlot": "7:00pm",
///   "isPast": false,
///   "tables": [
///     { "id": 5, "capacity": 4, "status": "unavailable" },
///     { "id": 6, "capacity": 2, "status": "available" }
///   ]
/// }
/// ```
pub async fn get_tables(
    State(state): State<AppState>,
    Query(query): Query<TablesQuery>,
) -> Result<Json<Resolution>, AppError> {
    let (date, slot) = state.resolver.parse_target(
        SlotKind::Reservation,
        query.date.as_deref(),
        query.time_slot.as_deref(),
    )?;

    let resolution = state
        .resolver
        .resolve(date, &slot, query.reservation_id.map(ReservationId::new))
        .await?;
    Ok(Json(resolution))
}

/// Query for a slot catalog.
#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// `reservation` (default) or `pickup`
    pub kind: Option<SlotKind>,
    /// Day the pastness flags refer to; defaults to today
    pub date: Option<NaiveDate>,
}

/// A slot catalog for one day.
#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    /// Catalog kind
    pub kind: SlotKind,
    /// Day the flags refer to
    pub date: NaiveDate,
    /// Slots in order
    pub slots: Vec<SlotOption>,
}

/// The reservation or pick-up catalog with `isPast` per slot.
pub async fn get_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> Json<SlotsResponse> {
    let kind = query.kind.unwrap_or(SlotKind::Reservation);
    let date = query.date.unwrap_or_else(|| state.resolver.today());

    Json(SlotsResponse {
        kind,
        date,
        slots: state.resolver.slots(kind, date),
    })
}

/// Query for a calendar week.
#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    /// Any day in the base week; defaults to today
    pub anchor: Option<NaiveDate>,
    /// Weeks forward (positive) or back (negative)
    pub shift: Option<i64>,
}

/// One calendar week.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarResponse {
    /// Venue-local today
    pub today: NaiveDate,
    /// Sunday to Saturday
    pub days: Vec<CalendarDay>,
}

/// The week containing `anchor`, shifted by `shift` weeks.
pub async fn get_calendar(
    State(state): State<AppState>,
    Query(query): Query<CalendarQuery>,
) -> Json<CalendarResponse> {
    Json(CalendarResponse {
        today: state.resolver.today(),
        days: state.resolver.week(query.anchor, query.shift.unwrap_or(0)),
    })
}
