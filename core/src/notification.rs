//! Booking confirmation delivery.
//!
//! Delivery is best-effort. A failed or slow notifier never changes the
//! outcome of the booking that triggered it; the dispatcher in the booking
//! crate logs the failure and moves on.

use crate::BoxFuture;
use crate::reservation::Reservation;
use thiserror::Error;

/// Errors raised while sending a confirmation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The delivery channel rejected or failed the message
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// Delivery did not finish in time
    #[error("Notification timed out after {0} ms")]
    Timeout(u64),
}

/// Sends booking confirmations to guests
pub trait Notifier: Send + Sync {
    /// Send the confirmation for a newly created reservation.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::Delivery`] if the channel fails.
    fn send_confirmation<'a>(
        &'a self,
        reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>>;
}
