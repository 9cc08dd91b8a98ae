//! Prometheus metrics for observability and monitoring.
//!
//! Metric families recorded across the workspace:
//! - Reservation mutations (created, updated, cancelled, conflicts)
//! - Availability resolution
//! - Reservation store latency
//! - Notification delivery
//! - Retry attempts
//! - Store runtime (reducer, commands)
//!
//! # Example
//!
//! ```rust,no_run
//! use tablebook_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from a `/metrics` route
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder and renderer.
///
/// Installs the global recorder; the HTTP layer serves [`MetricsServer::render`].
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for the given advertised address.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if metrics exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs
    /// a warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "reservations_created_total",
        "Total number of reservations created"
    );
    describe_counter!(
        "reservations_updated_total",
        "Total number of reservations updated"
    );
    describe_counter!(
        "reservations_cancelled_total",
        "Total number of reservations cancelled"
    );
    describe_counter!(
        "reservations_conflicts_total",
        "Total number of mutations rejected because a table was taken"
    );
    describe_counter!(
        "reservations_rejected_total",
        "Total number of mutations rejected by validation"
    );

    describe_counter!(
        "availability_resolutions_total",
        "Total number of availability resolutions"
    );
    describe_histogram!(
        "availability_resolve_duration_seconds",
        "Time taken to resolve table availability"
    );

    describe_histogram!(
        "reservation_store_duration_seconds",
        "Time taken by reservation store calls"
    );
    describe_counter!(
        "reservation_store_errors_total",
        "Total number of failed reservation store calls"
    );

    describe_counter!(
        "notifications_sent_total",
        "Total number of confirmations delivered"
    );
    describe_counter!(
        "notifications_failed_total",
        "Total number of confirmations that failed or timed out"
    );

    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!(
        "retry_exhausted_total",
        "Total number of operations that exhausted max retries"
    );
}

/// Reservation mutation metrics recorder.
pub struct ReservationMetrics;

impl ReservationMetrics {
    /// Record a created reservation.
    pub fn record_created() {
        counter!("reservations_created_total").increment(1);
    }

    /// Record an updated reservation.
    pub fn record_updated() {
        counter!("reservations_updated_total").increment(1);
    }

    /// Record a cancelled reservation.
    pub fn record_cancelled() {
        counter!("reservations_cancelled_total").increment(1);
    }

    /// Record a mutation that lost the race for a table.
    pub fn record_conflict(operation: &'static str) {
        counter!("reservations_conflicts_total", "operation" => operation).increment(1);
    }

    /// Record a mutation rejected before reaching the store.
    pub fn record_rejected(operation: &'static str) {
        counter!("reservations_rejected_total", "operation" => operation).increment(1);
    }
}

/// Availability resolution metrics recorder.
pub struct AvailabilityMetrics;

impl AvailabilityMetrics {
    /// Record one resolution.
    pub fn record_resolve(duration: Duration) {
        counter!("availability_resolutions_total").increment(1);
        histogram!("availability_resolve_duration_seconds").record(duration.as_secs_f64());
    }
}

/// Reservation store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a store call.
    pub fn record_call(operation: &'static str, duration: Duration) {
        histogram!("reservation_store_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Record a failed store call.
    pub fn record_error(operation: &'static str) {
        counter!("reservation_store_errors_total", "operation" => operation).increment(1);
    }
}

/// Notification delivery metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record a delivered confirmation.
    pub fn record_sent() {
        counter!("notifications_sent_total").increment(1);
    }

    /// Record a failed or timed-out confirmation.
    pub fn record_failed() {
        counter!("notifications_failed_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}
