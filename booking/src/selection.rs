//! Table selection for one actor's in-progress booking.
//!
//! [`SelectionSet`] holds the pure toggle rules. [`SelectionReducer`] drives a
//! whole [`BookingSession`]: it picks the date and slot, asks the resolver
//! for availability, reconciles the selection with every answer, and finally
//! submits through the mutator. Resolver and mutator calls are effects, so
//! the reducer itself stays synchronous and testable without a store.
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new(BookingSession::new(Actor::User), SelectionReducer, env);
//!
//! store.send(SelectionAction::SelectDate { date }).await?;
//! store
//!     .send_and_wait_for(
//!         SelectionAction::SelectTimeSlot { slot },
//!         |action| matches!(action, SelectionAction::TablesResolved { .. }),
//!         Duration::from_secs(1),
//!     )
//!     .await?;
//! store.send(SelectionAction::ToggleTable { table_id: TableId::new(5) }).await?;
//! ```

use crate::availability::{AvailabilityResolver, Resolution};
use crate::error::BookingError;
use crate::mutator::{BookingRequest, ReservationMutator};
use crate::validation::{ValidationErrors, field, validate_contact};
use chrono::NaiveDate;
use serde::Serialize;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use tablebook_core::effect::Effect;
use tablebook_core::reducer::Reducer;
use tablebook_core::reservation::{Actor, ContactDetails, Reservation, ReservationId};
use tablebook_core::slot::TimeSlot;
use tablebook_core::table::{
    MAX_TABLES_PER_BOOKING, TableAvailability, TableId, TableSet, TableStatus,
};

/// What a click did to the selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    /// The table was added
    Selected,
    /// The table was removed
    Deselected,
    /// The table is unavailable; nothing changed
    Ignored,
}

/// Tables chosen for one in-progress booking, in click order.
///
/// Never longer than [`MAX_TABLES_PER_BOOKING`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionSet(SmallVec<[TableId; MAX_TABLES_PER_BOOKING]>);

impl SelectionSet {
    /// Empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an existing reservation's tables
    #[must_use]
    pub fn from_tables(tables: &TableSet) -> Self {
        Self(tables.iter().collect())
    }

    /// Number of selected tables
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `table` is selected
    #[must_use]
    pub fn contains(&self, table: TableId) -> bool {
        self.0.contains(&table)
    }

    /// Selected ids in click order
    #[must_use]
    pub fn as_slice(&self) -> &[TableId] {
        &self.0
    }

    /// Drop every selected table
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Apply a click on `table`.
    ///
    /// - selected → deselected, always
    /// - unavailable → ignored
    /// - available → selected while fewer than two are chosen
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::SelectionLimitExceeded`] when a third table is
    /// clicked; the selection is left unchanged.
    pub fn toggle(&mut self, table: &TableAvailability) -> Result<Toggle, BookingError> {
        if let Some(position) = self.0.iter().position(|id| *id == table.id) {
            self.0.remove(position);
            return Ok(Toggle::Deselected);
        }
        if table.status == TableStatus::Unavailable {
            return Ok(Toggle::Ignored);
        }
        if self.0.len() >= MAX_TABLES_PER_BOOKING {
            return Err(BookingError::selection_limit());
        }
        self.0.push(table.id);
        Ok(Toggle::Selected)
    }

    /// Keep only tables that `tables` reports as available.
    ///
    /// Returns the tables that were dropped, in selection order.
    pub fn retain_available(&mut self, tables: &[TableAvailability]) -> Vec<TableId> {
        let mut dropped = Vec::new();
        self.0.retain(|id| {
            let available = tables
                .iter()
                .any(|table| table.id == *id && table.status != TableStatus::Unavailable);
            if !available {
                dropped.push(*id);
            }
            available
        });
        dropped
    }
}

/// Where the session is in its lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Date or slot still missing
    #[default]
    Idle,
    /// Waiting for availability
    Resolving,
    /// Availability known, tables can be toggled
    Ready,
    /// Waiting for the mutator
    Submitting,
    /// Booking committed
    Completed,
}

/// Messages for the actor
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Selected tables were taken by someone else and were deselected
    TablesDropped {
        /// The tables that were removed from the selection
        tables: Vec<TableId>,
    },
    /// An action was refused; the session is otherwise unchanged
    Rejected(BookingError),
}

/// One actor's in-progress booking.
///
/// Owned by a single interaction and passed explicitly; nothing here is
/// shared between actors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingSession {
    /// Who is booking (recorded as `doneBy`)
    pub actor: Actor,
    /// Reservation being edited, if any
    pub editing: Option<ReservationId>,
    /// Stored (date, slot) of the reservation being edited
    pub original_slot: Option<(NaiveDate, TimeSlot)>,
    /// Chosen day
    pub date: Option<NaiveDate>,
    /// Chosen slot
    pub time_slot: Option<TimeSlot>,
    /// Chosen (date, slot) starts before now
    pub is_past: bool,
    /// Latest availability for (date, slot)
    pub tables: Vec<TableAvailability>,
    /// Chosen tables
    pub selection: SelectionSet,
    /// Contact fields as typed so far
    pub contact: ContactDetails,
    /// Lifecycle phase
    pub phase: Phase,
    /// Messages not yet dismissed
    pub notices: Vec<Notice>,
    /// The committed reservation once submitted
    pub confirmed: Option<Reservation>,
    resolve_seq: u64,
}

impl BookingSession {
    /// Fresh booking for `actor`
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }

    /// Availability with the actor's own choices marked `selected`
    #[must_use]
    pub fn table_view(&self) -> Vec<TableAvailability> {
        self.tables
            .iter()
            .map(|table| {
                let mut table = *table;
                if self.selection.contains(table.id) {
                    table.status = TableStatus::Selected;
                }
                table
            })
            .collect()
    }

    /// Sequence number of the latest availability request
    #[must_use]
    pub const fn resolve_seq(&self) -> u64 {
        self.resolve_seq
    }

    /// Whether the chosen slot is past and the booking would land in it.
    ///
    /// An edit that keeps its stored (date, slot) may touch a past booking.
    #[must_use]
    pub fn blocked_by_past(&self) -> bool {
        if !self.is_past {
            return false;
        }
        match (&self.original_slot, self.date, &self.time_slot) {
            (Some((date, slot)), Some(chosen_date), Some(chosen_slot)) => {
                *date != chosen_date || slot != chosen_slot
            },
            _ => true,
        }
    }

    fn reject(&mut self, error: BookingError) {
        tracing::debug!(%error, "Session action rejected");
        self.notices.push(Notice::Rejected(error));
    }
}

/// Actions for [`SelectionReducer`]
#[derive(Clone, Debug)]
pub enum SelectionAction {
    /// Start a new booking
    Begin {
        /// Who is booking
        actor: Actor,
    },
    /// Start editing a stored reservation
    EditExisting {
        /// Who is editing
        actor: Actor,
        /// The stored reservation
        reservation: Reservation,
    },
    /// Pick a day; clears the selection
    SelectDate {
        /// The day
        date: NaiveDate,
    },
    /// Pick a slot; clears the selection
    SelectTimeSlot {
        /// The slot
        slot: TimeSlot,
    },
    /// Click on a table
    ToggleTable {
        /// The clicked table
        table_id: TableId,
    },
    /// Replace the typed contact fields
    SetContact {
        /// Contact fields
        contact: ContactDetails,
    },
    /// Ask for fresh availability
    Refresh,
    /// Availability arrived
    TablesResolved {
        /// Request sequence number
        seq: u64,
        /// The answer
        resolution: Resolution,
    },
    /// Availability could not be fetched
    ResolveFailed {
        /// Request sequence number
        seq: u64,
        /// Why
        error: BookingError,
    },
    /// Commit the booking
    Submit,
    /// The booking was committed
    Submitted {
        /// The stored reservation
        reservation: Reservation,
    },
    /// The commit was refused
    SubmitFailed {
        /// Why
        error: BookingError,
    },
    /// Clear all notices
    DismissNotices,
}

/// Dependencies for the selection reducer
#[derive(Clone)]
pub struct SelectionEnvironment {
    /// Availability lookups
    pub resolver: Arc<AvailabilityResolver>,
    /// Commits
    pub mutator: Arc<ReservationMutator>,
}

impl SelectionEnvironment {
    /// Bundle a resolver and a mutator
    #[must_use]
    pub const fn new(resolver: Arc<AvailabilityResolver>, mutator: Arc<ReservationMutator>) -> Self {
        Self { resolver, mutator }
    }
}

/// Reducer for [`BookingSession`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectionReducer;

type Effects = SmallVec<[Effect<SelectionAction>; 4]>;

impl SelectionReducer {
    /// Request availability for the session's (date, slot), if both are set.
    fn resolve(state: &mut BookingSession, env: &SelectionEnvironment) -> Effects {
        let (Some(date), Some(slot)) = (state.date, state.time_slot.clone()) else {
            state.phase = Phase::Idle;
            return SmallVec::new();
        };

        state.resolve_seq += 1;
        state.phase = Phase::Resolving;

        let seq = state.resolve_seq;
        let exclude = state.editing;
        let resolver = Arc::clone(&env.resolver);

        smallvec![Effect::future(async move {
            Some(match resolver.resolve(date, &slot, exclude).await {
                Ok(resolution) => SelectionAction::TablesResolved { seq, resolution },
                Err(error) => SelectionAction::ResolveFailed { seq, error },
            })
        })]
    }

    /// Pre-submit checks that need no I/O
    fn prepare(state: &BookingSession) -> Result<BookingRequest, BookingError> {
        let (Some(date), Some(time_slot)) = (state.date, state.time_slot.clone()) else {
            return Err(BookingError::InvalidSlot(
                "choose a date and a time slot first".to_string(),
            ));
        };

        let mut errors = ValidationErrors::new();
        if let Err(contact_errors) = validate_contact(&state.contact) {
            errors.extend(contact_errors);
        }
        if state.blocked_by_past() {
            errors.push(field::TIME_SLOT, "is in the past");
        }
        errors.into_result()?;

        if state.selection.is_empty() {
            return Err(BookingError::NoTableSelected);
        }

        Ok(BookingRequest {
            date,
            time_slot,
            contact: state.contact.clone(),
            tables: state.selection.as_slice().to_vec(),
        })
    }
}

impl Reducer for SelectionReducer {
    type State = BookingSession;
    type Action = SelectionAction;
    type Environment = SelectionEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut BookingSession,
        action: SelectionAction,
        env: &SelectionEnvironment,
    ) -> Effects {
        match action {
            SelectionAction::Begin { actor } => {
                *state = BookingSession {
                    resolve_seq: state.resolve_seq,
                    ..BookingSession::new(actor)
                };
                SmallVec::new()
            },

            SelectionAction::EditExisting { actor, reservation } => {
                *state = BookingSession {
                    actor,
                    editing: Some(reservation.id),
                    original_slot: Some((reservation.date, reservation.time_slot.clone())),
                    date: Some(reservation.date),
                    time_slot: Some(reservation.time_slot.clone()),
                    is_past: env.resolver.is_past(reservation.date, &reservation.time_slot),
                    selection: SelectionSet::from_tables(&reservation.tables),
                    contact: reservation.contact,
                    resolve_seq: state.resolve_seq,
                    ..BookingSession::default()
                };
                Self::resolve(state, env)
            },

            SelectionAction::SelectDate { date } => {
                if state.phase == Phase::Submitting {
                    return SmallVec::new();
                }
                state.date = Some(date);
                state.selection.clear();
                state.tables.clear();
                state.is_past = match &state.time_slot {
                    Some(slot) => env.resolver.is_past(date, slot),
                    None => date < env.resolver.today(),
                };
                Self::resolve(state, env)
            },

            SelectionAction::SelectTimeSlot { slot } => {
                if state.phase == Phase::Submitting {
                    return SmallVec::new();
                }
                state.is_past = state
                    .date
                    .is_some_and(|date| env.resolver.is_past(date, &slot));
                state.time_slot = Some(slot);
                state.selection.clear();
                state.tables.clear();
                Self::resolve(state, env)
            },

            SelectionAction::ToggleTable { table_id } => {
                if state.phase != Phase::Ready {
                    return SmallVec::new();
                }
                if state.blocked_by_past() {
                    state.reject(BookingError::Validation(ValidationErrors::single(
                        field::TIME_SLOT,
                        "is in the past",
                    )));
                    return SmallVec::new();
                }
                let Some(table) = state.tables.iter().find(|table| table.id == table_id).copied()
                else {
                    return SmallVec::new();
                };
                if let Err(error) = state.selection.toggle(&table) {
                    state.reject(error);
                }
                SmallVec::new()
            },

            SelectionAction::SetContact { contact } => {
                state.contact = contact;
                SmallVec::new()
            },

            SelectionAction::Refresh => {
                if state.phase == Phase::Submitting {
                    return SmallVec::new();
                }
                Self::resolve(state, env)
            },

            SelectionAction::TablesResolved { seq, resolution } => {
                let current = Some(resolution.date) == state.date
                    && Some(&resolution.time_slot) == state.time_slot.as_ref();
                if seq != state.resolve_seq || !current {
                    tracing::trace!(seq, latest = state.resolve_seq, "Discarding stale availability");
                    return SmallVec::new();
                }

                state.is_past = resolution.is_past;
                state.tables = resolution.tables;
                let dropped = state.selection.retain_available(&state.tables);
                if !dropped.is_empty() {
                    tracing::debug!(dropped = ?dropped, "Selected tables became unavailable");
                    state.notices.push(Notice::TablesDropped { tables: dropped });
                }
                if state.phase == Phase::Resolving {
                    state.phase = Phase::Ready;
                }
                SmallVec::new()
            },

            SelectionAction::ResolveFailed { seq, error } => {
                if seq != state.resolve_seq {
                    return SmallVec::new();
                }
                if state.phase == Phase::Resolving {
                    state.phase = Phase::Ready;
                }
                state.reject(error);
                SmallVec::new()
            },

            SelectionAction::Submit => {
                if state.phase != Phase::Ready {
                    return SmallVec::new();
                }
                let request = match Self::prepare(state) {
                    Ok(request) => request,
                    Err(error) => {
                        state.reject(error);
                        return SmallVec::new();
                    },
                };

                state.phase = Phase::Submitting;
                let mutator = Arc::clone(&env.mutator);
                let actor = state.actor;
                let editing = state.editing;

                smallvec![Effect::future(async move {
                    let result = match editing {
                        Some(id) => mutator.update(id, request, actor).await,
                        None => mutator.create(request, actor).await,
                    };
                    Some(match result {
                        Ok(reservation) => SelectionAction::Submitted { reservation },
                        Err(error) => SelectionAction::SubmitFailed { error },
                    })
                })]
            },

            SelectionAction::Submitted { reservation } => {
                state.phase = Phase::Completed;
                state.editing = Some(reservation.id);
                state.original_slot = Some((reservation.date, reservation.time_slot.clone()));
                state.confirmed = Some(reservation);
                SmallVec::new()
            },

            SelectionAction::SubmitFailed { error } => {
                state.phase = Phase::Ready;
                let refresh = error.requires_refresh();
                state.reject(error);
                if refresh {
                    Self::resolve(state, env)
                } else {
                    SmallVec::new()
                }
            },

            SelectionAction::DismissNotices => {
                state.notices.clear();
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::notification::NotificationDispatcher;
    use chrono::{FixedOffset, NaiveTime};
    use proptest::prelude::*;
    use tablebook_core::slot::Venue;
    use tablebook_core::table::DiningTable;
    use tablebook_testing::{InMemoryReservationStore, ReducerTest, assertions, test_clock};

    fn environment() -> SelectionEnvironment {
        let store = Arc::new(InMemoryReservationStore::with_tables(&[(5, 4), (6, 2), (7, 6)]));
        let venue = Arc::new(
            Venue::new(
                FixedOffset::east_opt(0).expect("valid offset"),
                NaiveTime::from_hms_opt(11, 0, 0).expect("valid time"),
                NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
            )
            .expect("valid venue"),
        );
        let clock = Arc::new(test_clock());
        SelectionEnvironment::new(
            Arc::new(AvailabilityResolver::new(store.clone(), Arc::clone(&venue), clock.clone())),
            Arc::new(ReservationMutator::new(
                store,
                venue,
                clock,
                NotificationDispatcher::log_only(),
            )),
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).expect("valid date")
    }

    fn slot(label: &str) -> TimeSlot {
        TimeSlot::parse(label).expect("valid slot")
    }

    fn table(id: u32, capacity: u32, status: TableStatus) -> TableAvailability {
        TableAvailability::new(DiningTable::new(TableId::new(id), capacity), status)
    }

    fn resolution(statuses: &[(u32, TableStatus)]) -> Resolution {
        Resolution {
            date: date(),
            time_slot: slot("7:00pm"),
            is_past: false,
            tables: statuses.iter().map(|(id, status)| table(*id, 4, *status)).collect(),
        }
    }

    fn all_available() -> Resolution {
        resolution(&[
            (5, TableStatus::Available),
            (6, TableStatus::Available),
            (7, TableStatus::Available),
        ])
    }

    /// A session that has picked (2025-06-10, 7:00pm) and received availability
    fn ready_session() -> BookingSession {
        let mut state = BookingSession::new(Actor::User);
        state.date = Some(date());
        state.time_slot = Some(slot("7:00pm"));
        state.tables = all_available().tables;
        state.phase = Phase::Ready;
        state.resolve_seq = 1;
        state
    }

    fn click(id: u32) -> SelectionAction {
        SelectionAction::ToggleTable {
            table_id: TableId::new(id),
        }
    }

    fn valid_contact() -> ContactDetails {
        ContactDetails {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+44 20 7946 0018".to_string(),
        }
    }

    #[test]
    fn third_table_is_rejected_and_selection_kept() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([click(5), click(6), click(7)])
            .then_state(|state| {
                assert_eq!(state.selection.as_slice(), &[TableId::new(5), TableId::new(6)]);
                assert_eq!(
                    state.notices,
                    vec![Notice::Rejected(BookingError::SelectionLimitExceeded { max: 2 })]
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn clicking_a_selected_table_deselects_it() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([click(5), click(6), click(5), click(7)])
            .then_state(|state| {
                assert_eq!(state.selection.as_slice(), &[TableId::new(6), TableId::new(7)]);
                assert!(state.notices.is_empty());
            })
            .run();
    }

    #[test]
    fn unavailable_tables_ignore_clicks() {
        let mut state = ready_session();
        state.tables = resolution(&[(5, TableStatus::Unavailable), (6, TableStatus::Available)]).tables;

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(click(5))
            .then_state(|state| {
                assert!(state.selection.is_empty());
                assert!(state.notices.is_empty());
            })
            .run();
    }

    #[test]
    fn table_view_marks_selected_tables() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_action(click(6))
            .then_state(|state| {
                let statuses: Vec<_> = state.table_view().iter().map(|t| t.status).collect();
                assert_eq!(
                    statuses,
                    vec![TableStatus::Available, TableStatus::Selected, TableStatus::Available]
                );
            })
            .run();
    }

    #[test]
    fn changing_slot_clears_selection_and_resolves() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([
                click(5),
                SelectionAction::SelectTimeSlot {
                    slot: slot("8:00pm"),
                },
            ])
            .then_state(|state| {
                assert!(state.selection.is_empty());
                assert!(state.tables.is_empty());
                assert_eq!(state.phase, Phase::Resolving);
                assert_eq!(state.resolve_seq(), 2);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn date_without_slot_does_not_resolve() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(BookingSession::new(Actor::Staff))
            .when_action(SelectionAction::SelectDate { date: date() })
            .then_state(|state| {
                assert_eq!(state.date, Some(date()));
                assert_eq!(state.phase, Phase::Idle);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn stale_resolution_is_discarded() {
        let mut state = ready_session();
        state.resolve_seq = 3;
        state.tables.clear();
        state.phase = Phase::Resolving;

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(SelectionAction::TablesResolved {
                seq: 2,
                resolution: all_available(),
            })
            .then_state(|state| {
                assert!(state.tables.is_empty());
                assert_eq!(state.phase, Phase::Resolving);
            })
            .run();
    }

    #[test]
    fn resolution_drops_tables_taken_by_others() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([
                click(5),
                click(6),
                SelectionAction::TablesResolved {
                    seq: 1,
                    resolution: resolution(&[
                        (5, TableStatus::Available),
                        (6, TableStatus::Unavailable),
                        (7, TableStatus::Available),
                    ]),
                },
            ])
            .then_state(|state| {
                assert_eq!(state.selection.as_slice(), &[TableId::new(5)]);
                assert_eq!(
                    state.notices,
                    vec![Notice::TablesDropped {
                        tables: vec![TableId::new(6)]
                    }]
                );
            })
            .run();
    }

    #[test]
    fn past_slot_blocks_toggles() {
        let mut state = ready_session();
        state.is_past = true;

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(click(5))
            .then_state(|state| {
                assert!(state.selection.is_empty());
                assert!(matches!(
                    state.notices.as_slice(),
                    [Notice::Rejected(BookingError::Validation(errors))] if errors.has(field::TIME_SLOT)
                ));
            })
            .run();
    }

    /// Editing yesterday's 7:00pm booking, seen from 2025-06-01 09:00
    fn past_edit_session() -> BookingSession {
        let yesterday = NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid date");
        let mut state = ready_session();
        state.date = Some(yesterday);
        state.is_past = true;
        state.editing = Some(ReservationId::new(9));
        state.original_slot = Some((yesterday, slot("7:00pm")));
        state.selection = SelectionSet::from_tables(
            &TableSet::try_from_ids([TableId::new(5)]).expect("valid tables"),
        );
        state
    }

    #[test]
    fn contact_only_edit_of_a_past_booking_submits() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(past_edit_session())
            .when_actions([
                SelectionAction::SetContact {
                    contact: valid_contact(),
                },
                SelectionAction::Submit,
            ])
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Submitting);
                assert!(state.notices.is_empty());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn past_edit_moved_to_another_past_slot_is_rejected() {
        let mut state = past_edit_session();
        state.time_slot = Some(slot("7:30pm"));
        state.contact = valid_contact();

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(SelectionAction::Submit)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Ready);
                assert!(matches!(
                    state.notices.as_slice(),
                    [Notice::Rejected(BookingError::Validation(errors))] if errors.has(field::TIME_SLOT)
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn submit_without_tables_is_rejected_before_any_call() {
        let mut state = ready_session();
        state.contact = valid_contact();

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(SelectionAction::Submit)
            .then_state(|state| {
                assert_eq!(state.phase, Phase::Ready);
                assert_eq!(state.notices, vec![Notice::Rejected(BookingError::NoTableSelected)]);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn submit_with_bad_contact_reports_fields() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([click(5), SelectionAction::Submit])
            .then_state(|state| {
                assert!(matches!(
                    state.notices.as_slice(),
                    [Notice::Rejected(BookingError::Validation(errors))]
                        if errors.has(field::NAME) && errors.has(field::EMAIL) && errors.has(field::PHONE)
                ));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn valid_submit_starts_the_commit() {
        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(ready_session())
            .when_actions([
                click(5),
                SelectionAction::SetContact {
                    contact: valid_contact(),
                },
                SelectionAction::Submit,
            ])
            .then_state(|state| assert_eq!(state.phase, Phase::Submitting))
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn slot_taken_at_commit_re_resolves_and_keeps_contact() {
        let mut state = ready_session();
        state.phase = Phase::Submitting;
        state.contact = valid_contact();
        state.selection = SelectionSet::from_tables(
            &TableSet::try_from_ids([TableId::new(5)]).expect("valid tables"),
        );

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(SelectionAction::SubmitFailed {
                error: BookingError::SlotUnavailable {
                    tables: vec![TableId::new(5)],
                },
            })
            .then_state(|state| {
                assert_eq!(state.contact, valid_contact());
                assert_eq!(state.phase, Phase::Resolving);
                assert_eq!(state.resolve_seq(), 2);
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn validation_failure_at_commit_does_not_re_resolve() {
        let mut state = ready_session();
        state.phase = Phase::Submitting;

        ReducerTest::new(SelectionReducer)
            .with_env(environment())
            .given_state(state)
            .when_action(SelectionAction::SubmitFailed {
                error: BookingError::NoTableSelected,
            })
            .then_state(|state| assert_eq!(state.phase, Phase::Ready))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    proptest! {
        #[test]
        fn selection_never_exceeds_cap(clicks in tablebook_testing::properties::clicks(8, 40)) {
            let tables: Vec<TableAvailability> = (1..=8)
                .map(|id| {
                    let status = if id % 3 == 0 { TableStatus::Unavailable } else { TableStatus::Available };
                    table(id, 2, status)
                })
                .collect();
            let mut selection = SelectionSet::new();

            for id in clicks {
                let Some(clicked) = tables.iter().find(|t| t.id == id) else { continue };
                let before = selection.clone();
                match selection.toggle(clicked) {
                    Ok(Toggle::Ignored) => prop_assert_eq!(&selection, &before),
                    Ok(_) => {},
                    Err(_) => {
                        prop_assert_eq!(before.len(), MAX_TABLES_PER_BOOKING);
                        prop_assert_eq!(&selection, &before);
                    },
                }
                prop_assert!(selection.len() <= MAX_TABLES_PER_BOOKING);
                prop_assert!(selection.as_slice().iter().all(|id| id.get() % 3 != 0));
            }
        }

        #[test]
        fn date_or_slot_change_always_empties_selection(
            clicks in tablebook_testing::properties::clicks(3, 6),
            change_date in any::<bool>(),
        ) {
            let env = environment();
            let mut state = ready_session();
            for id in clicks {
                let id = TableId::new(id.get() % 3 + 5);
                let _ = SelectionReducer.reduce(&mut state, SelectionAction::ToggleTable { table_id: id }, &env);
            }

            let change = if change_date {
                SelectionAction::SelectDate { date: date().succ_opt().expect("valid date") }
            } else {
                SelectionAction::SelectTimeSlot { slot: slot("8:30pm") }
            };
            let _ = SelectionReducer.reduce(&mut state, change, &env);
            prop_assert!(state.selection.is_empty());
        }
    }
}
