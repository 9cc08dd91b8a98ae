//! Notifier doubles.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tablebook_core::BoxFuture;
use tablebook_core::notification::{NotificationError, Notifier};
use tablebook_core::reservation::{Reservation, ReservationId};
use tokio::sync::Notify;

/// Records every confirmation it is asked to send.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ReservationId>>>,
    delivered: Arc<Notify>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reservation ids confirmed so far, in delivery order
    #[must_use]
    pub fn sent(&self) -> Vec<ReservationId> {
        self.sent
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |guard| guard.clone())
    }

    /// Wait until at least `count` confirmations arrived.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.delivered.notified();
                if self.sent().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

impl Notifier for RecordingNotifier {
    fn send_confirmation<'a>(
        &'a self,
        reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(reservation.id);
            }
            self.delivered.notify_waiters();
            Ok(())
        })
    }
}

/// Fails every delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send_confirmation<'a>(
        &'a self,
        reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            Err(NotificationError::Delivery(format!(
                "relay refused confirmation for reservation {}",
                reservation.id
            )))
        })
    }
}

/// Never finishes a delivery; exercises the dispatcher's timeout.
#[derive(Clone, Copy, Debug, Default)]
pub struct HangingNotifier;

impl Notifier for HangingNotifier {
    fn send_confirmation<'a>(
        &'a self,
        _reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(std::future::pending())
    }
}
