//! # Tablebook
//!
//! Table reservations for a single restaurant: per-slot availability, the
//! two-table selection rules, and create / edit / unreserve with an audit
//! trail.
//!
//! ## Layers
//!
//! - [`availability`]: which tables are free at a (date, slot), and whether
//!   that slot is already past
//! - [`selection`]: one actor's in-progress booking as a reducer, driven by
//!   the runtime `Store`
//! - [`mutator`]: the commit path, re-checking availability under a
//!   per-slot lock and writing the audit record with the change
//! - [`notification`]: best-effort confirmations that never fail a booking
//! - [`api`] / [`server`]: the axum HTTP surface
//!
//! ## Example
//!
//! ```ignore
//! let state = tablebook::bootstrap::build_state(&Config::from_env()?).await?;
//! let app = tablebook::server::build_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod api;
pub mod availability;
pub mod bootstrap;
mod bounded;
pub mod config;
pub mod error;
pub mod mutator;
pub mod notification;
pub mod selection;
pub mod server;
pub mod validation;

pub use availability::{AvailabilityResolver, Resolution};
pub use config::Config;
pub use error::BookingError;
pub use mutator::{BookingRequest, CancelOutcome, ReservationMutator};
pub use notification::NotificationDispatcher;
pub use selection::{BookingSession, SelectionAction, SelectionEnvironment, SelectionReducer};
