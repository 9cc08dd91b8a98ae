//! Reservation endpoints.
//!
//! - POST /api/reservation - book tables
//! - GET /api/reservation/:id - one reservation, active or cancelled
//! - PUT /api/reservation/:id - edit with a full field set
//! - PUT /api/unreserve?reservationId= - cancel, releasing the tables
//! - GET /api/reservations?date= - the day view for staff
//! - GET /api/reservation/:id/logs - the reservation's audit trail
//! - GET /api/audit?limit= - the most recent audit entries
//!
//! Audit entries are written by the store in the same commit as the change
//! they describe; there is no separate log endpoint to call.

use super::ActorTag;
use super::error::AppError;
use crate::bounded::store_call;
use crate::error::BookingError;
use crate::mutator::{BookingRequest, CancelOutcome};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tablebook_core::audit::AuditLogEntry;
use tablebook_core::reservation::{ContactDetails, Reservation, ReservationId};
use tablebook_core::slot::SlotKind;
use tablebook_core::table::TableId;

/// Default page size for `/api/audit`
const DEFAULT_AUDIT_LIMIT: usize = 50;

/// Largest page `/api/audit` serves
const MAX_AUDIT_LIMIT: usize = 500;

/// Body of a create or edit.
///
/// Edits carry the full field set, not a patch.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReservationBody {
    /// Calendar day, `YYYY-MM-DD`
    pub date: Option<String>,
    /// Reservation slot label
    pub time_slot: Option<String>,
    /// Guest name
    pub name: String,
    /// Guest email
    pub email: String,
    /// Guest phone
    pub phone: String,
    /// Selected tables
    pub table_ids: Vec<u32>,
}

impl ReservationBody {
    fn into_request(self, state: &AppState) -> Result<BookingRequest, BookingError> {
        let (date, time_slot) = state.resolver.parse_target(
            SlotKind::Reservation,
            self.date.as_deref(),
            self.time_slot.as_deref(),
        )?;

        Ok(BookingRequest {
            date,
            time_slot,
            contact: ContactDetails {
                name: self.name,
                email: self.email,
                phone: self.phone,
            },
            tables: self.table_ids.into_iter().map(TableId::new).collect(),
        })
    }
}

/// Book tables.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/reservation \
///   -H 'content-type: application/json' \
///   -d '{"date":"2025-06-10","timeSlot":"7:00pm","name":"Ada","email":"ada@example.com","phone":"555-0100","tableIds":[5]}'
/// ```
///
/// 201 with the stored reservation; 409 if a table was taken in the meantime.
pub async fn create_reservation(
    State(state): State<AppState>,
    ActorTag(actor): ActorTag,
    Json(body): Json<ReservationBody>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let request = body.into_request(&state)?;
    let reservation = state.mutator.create(request, actor).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// One reservation, active or cancelled.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.mutator.load(ReservationId::new(id)).await?))
}

/// Edit a reservation.
///
/// An edit that changes nothing is accepted and logs nothing.
pub async fn update_reservation(
    State(state): State<AppState>,
    ActorTag(actor): ActorTag,
    Path(id): Path<i64>,
    Json(body): Json<ReservationBody>,
) -> Result<Json<Reservation>, AppError> {
    let request = body.into_request(&state)?;
    let reservation = state
        .mutator
        .update(ReservationId::new(id), request, actor)
        .await?;
    Ok(Json(reservation))
}

/// Query for `/api/unreserve`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreserveQuery {
    /// Reservation to cancel
    pub reservation_id: Option<i64>,
}

/// Result of an unreserve.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreserveResponse {
    /// The reservation in its cancelled state
    pub reservation: Reservation,
    /// It had been cancelled before this call
    pub already_cancelled: bool,
}

/// Cancel a reservation.
///
/// Cancelling twice succeeds both times; only the first is logged.
pub async fn unreserve(
    State(state): State<AppState>,
    ActorTag(actor): ActorTag,
    Query(query): Query<UnreserveQuery>,
) -> Result<Json<UnreserveResponse>, AppError> {
    let id = query
        .reservation_id
        .ok_or_else(|| AppError::bad_request("reservationId is required"))?;

    let outcome = state.mutator.cancel(ReservationId::new(id), actor).await?;
    Ok(Json(UnreserveResponse {
        already_cancelled: matches!(outcome, CancelOutcome::AlreadyCancelled(_)),
        reservation: outcome.reservation().clone(),
    }))
}

/// Query for the day view.
#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// Calendar day
    pub date: NaiveDate,
}

/// Every reservation on one day, active and cancelled, ordered by slot.
pub async fn list_day(
    State(state): State<AppState>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let reservations = store_call(
        "reservations_on",
        state.store_timeout,
        state.store.reservations_on(query.date),
    )
    .await
    .map_err(BookingError::from)?;
    Ok(Json(reservations))
}

/// Audit trail of one reservation, oldest first.
pub async fn reservation_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let id = ReservationId::new(id);
    state.mutator.load(id).await?;

    let entries = store_call("entries_for", state.store_timeout, state.audit.entries_for(id))
        .await
        .map_err(BookingError::from)?;
    Ok(Json(entries))
}

/// Query for the audit feed.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Page size
    pub limit: Option<usize>,
}

/// Most recent audit entries across all reservations, newest first.
pub async fn recent_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    let entries = store_call("recent_audit", state.store_timeout, state.audit.recent(limit))
        .await
        .map_err(BookingError::from)?;
    Ok(Json(entries))
}
