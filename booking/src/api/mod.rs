//! HTTP endpoints.
//!
//! - `tables`: availability, slot catalogs and the calendar week
//! - `reservations`: create, read, edit, unreserve, day lists and audit logs

pub mod error;
pub mod reservations;
pub mod tables;

pub use error::AppError;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tablebook_core::reservation::Actor;

/// Header carrying the actor class recorded as `doneBy`
pub const ACTOR_HEADER: &str = "x-actor";

/// Who is acting, from the `x-actor` header.
///
/// Missing means [`Actor::User`]. Authentication and role checks happen in
/// front of this service; the header is trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorTag(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for ActorTag
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(ACTOR_HEADER) else {
            return Ok(Self(Actor::default()));
        };

        value
            .to_str()
            .ok()
            .and_then(Actor::parse)
            .map(Self)
            .ok_or_else(|| AppError::bad_request(format!("{ACTOR_HEADER} must be 'user' or 'staff'")))
    }
}
