//! Wiring the service from configuration.
//!
//! Picks the store (`PostgreSQL` when `DATABASE_URL` is set, in-memory
//! otherwise), seeds the floor plan, picks the notifier and assembles
//! [`AppState`].

use crate::config::{Config, ConfigError, NotificationConfig};
use crate::notification::{HttpNotifier, LogNotifier, NotificationDispatcher};
use crate::server::AppState;
use std::sync::Arc;
use std::time::Duration;
use tablebook_core::environment::{Clock, SystemClock};
use tablebook_core::notification::Notifier;
use tablebook_core::store::StoreError;
use tablebook_postgres::PostgresReservationStore;
use tablebook_runtime::retry::RetryPolicy;
use tablebook_testing::InMemoryReservationStore;
use thiserror::Error;

/// Startup failures
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be reached, migrated or seeded
    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Build the application state described by `config`.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the venue hours are invalid or the database
/// cannot be prepared.
pub async fn build_state(config: &Config) -> Result<AppState, BootstrapError> {
    let venue = Arc::new(config.venue.venue()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifications = NotificationDispatcher::new(
        notifier(&config.notification),
        config.timeouts.notification(),
    );
    let store_timeout = config.timeouts.store();

    let state = if let Some(postgres) = &config.postgres {
        tracing::info!(max_connections = postgres.max_connections, "Connecting to PostgreSQL");
        let store = PostgresReservationStore::connect(&postgres.url, postgres.max_connections).await?;
        if postgres.run_migrations {
            store.migrate().await?;
        }
        store.seed_tables(&config.venue.tables).await?;
        AppState::new(Arc::new(store), venue, clock, notifications, store_timeout)
    } else {
        tracing::warn!("DATABASE_URL not set; reservations are kept in memory only");
        let store = InMemoryReservationStore::new(config.venue.tables.clone());
        AppState::new(Arc::new(store), venue, clock, notifications, store_timeout)
    };

    tracing::info!(
        tables = config.venue.tables.len(),
        opening = %config.venue.opening,
        closing = %config.venue.closing,
        "Booking service wired"
    );
    Ok(state)
}

fn notifier(config: &NotificationConfig) -> Arc<dyn Notifier> {
    match &config.relay_url {
        Some(url) => {
            tracing::info!(relay = %url, "Confirmations go to the mail relay");
            Arc::new(
                HttpNotifier::new(url.clone()).with_retry(
                    RetryPolicy::builder()
                        .max_retries(config.max_retries)
                        .initial_delay(Duration::from_millis(200))
                        .with_jitter()
                        .build(),
                ),
            )
        },
        None => Arc::new(LogNotifier),
    }
}
