//! Application state for the booking HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - The availability resolver (read side)
//! - The reservation mutator (write side)
//! - Direct store handles for day lists and audit queries
//! - The Prometheus renderer, when metrics are enabled

use crate::availability::AvailabilityResolver;
use crate::mutator::ReservationMutator;
use crate::notification::NotificationDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tablebook_core::environment::Clock;
use tablebook_core::slot::Venue;
use tablebook_core::store::{AuditLog, ReservationStore};
use tablebook_runtime::metrics::MetricsServer;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Availability lookups
    pub resolver: Arc<AvailabilityResolver>,
    /// Create / update / cancel
    pub mutator: Arc<ReservationMutator>,
    /// Reservation reads outside the resolver
    pub store: Arc<dyn ReservationStore>,
    /// Audit trail reads
    pub audit: Arc<dyn AuditLog>,
    /// Bound on direct store calls made by handlers
    pub store_timeout: Duration,
    /// Prometheus renderer
    pub metrics: Option<Arc<MetricsServer>>,
}

impl AppState {
    /// Wire resolver and mutator over one store.
    #[must_use]
    pub fn new<S>(
        store: Arc<S>,
        venue: Arc<Venue>,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
        store_timeout: Duration,
    ) -> Self
    where
        S: ReservationStore + AuditLog + 'static,
    {
        let resolver = AvailabilityResolver::new(store.clone(), Arc::clone(&venue), Arc::clone(&clock))
            .with_store_timeout(store_timeout);
        let mutator = ReservationMutator::new(store.clone(), venue, clock, notifications)
            .with_store_timeout(store_timeout);

        Self {
            resolver: Arc::new(resolver),
            mutator: Arc::new(mutator),
            store: store.clone(),
            audit: store,
            store_timeout,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsServer>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
