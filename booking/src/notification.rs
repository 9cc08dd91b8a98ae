//! Best-effort booking confirmations.
//!
//! The mutator hands every freshly created reservation to a
//! [`NotificationDispatcher`], which delivers it on a background task under a
//! timeout. Whatever happens there is logged and counted; the booking itself
//! has already succeeded.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tablebook_core::BoxFuture;
use tablebook_core::notification::{NotificationError, Notifier};
use tablebook_core::reservation::Reservation;
use tablebook_runtime::metrics::NotificationMetrics;
use tablebook_runtime::retry::{RetryPolicy, retry_with_predicate};
use tokio::task::JoinHandle;

/// Default bound on one delivery, retries included
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns confirmation deliveries that can never fail a booking
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// Dispatch through `notifier`, giving each delivery `timeout`
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Dispatcher that only logs confirmations
    #[must_use]
    pub fn log_only() -> Self {
        Self::new(Arc::new(LogNotifier), DEFAULT_NOTIFICATION_TIMEOUT)
    }

    /// Deliver the confirmation for `reservation` in the background.
    ///
    /// The returned handle resolves once delivery succeeded, failed or timed
    /// out; dropping it does not cancel the delivery.
    pub fn dispatch(&self, reservation: Reservation) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.timeout;

        tokio::spawn(async move {
            match deliver(notifier.as_ref(), &reservation, timeout).await {
                Ok(()) => {
                    NotificationMetrics::record_sent();
                    tracing::debug!(reservation_id = %reservation.id, "Confirmation sent");
                },
                Err(error) => {
                    NotificationMetrics::record_failed();
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        %error,
                        "Confirmation not delivered; reservation stands"
                    );
                },
            }
        })
    }
}

async fn deliver(
    notifier: &dyn Notifier,
    reservation: &Reservation,
    timeout: Duration,
) -> Result<(), NotificationError> {
    match tokio::time::timeout(timeout, notifier.send_confirmation(reservation)).await {
        Ok(result) => result,
        Err(_) => {
            #[allow(clippy::cast_possible_truncation)] // Timeouts are far below u64::MAX ms
            let millis = timeout.as_millis() as u64;
            Err(NotificationError::Timeout(millis))
        },
    }
}

/// Writes confirmations to the log instead of sending them
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_confirmation<'a>(
        &'a self,
        reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            tracing::info!(
                reservation_id = %reservation.id,
                email = %reservation.contact.email,
                date = %reservation.date,
                time_slot = %reservation.time_slot,
                tables = %reservation.tables,
                "Booking confirmation"
            );
            Ok(())
        })
    }
}

/// Confirmation payload posted to the mail relay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationMessage<'a> {
    reservation_id: i64,
    to: &'a str,
    name: &'a str,
    date: String,
    time_slot: &'a str,
    tables: String,
}

impl<'a> ConfirmationMessage<'a> {
    fn for_reservation(reservation: &'a Reservation) -> Self {
        Self {
            reservation_id: reservation.id.get(),
            to: &reservation.contact.email,
            name: &reservation.contact.name,
            date: reservation.date.to_string(),
            time_slot: reservation.time_slot.label(),
            tables: reservation.tables.to_string(),
        }
    }
}

/// Posts confirmations as JSON to a mail relay.
///
/// Connection failures, timeouts and 5xx answers are retried with backoff;
/// 4xx answers fail immediately.
#[derive(Clone, Debug)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpNotifier {
    /// Post to `endpoint` with the default retry policy
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            retry: RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(200))
                .with_jitter()
                .build(),
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().is_some_and(|status| status.is_server_error())
}

impl Notifier for HttpNotifier {
    fn send_confirmation<'a>(
        &'a self,
        reservation: &'a Reservation,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            let message = ConfirmationMessage::for_reservation(reservation);

            retry_with_predicate(
                self.retry.clone(),
                || {
                    let request = self.client.post(self.endpoint.as_str()).json(&message);
                    async move {
                        request
                            .send()
                            .await
                            .and_then(reqwest::Response::error_for_status)
                    }
                },
                is_transient,
            )
            .await
            .map(|_| ())
            .map_err(|error| NotificationError::Delivery(error.to_string()))
        })
    }
}
