//! Configuration management for the booking service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Without `DATABASE_URL` the service runs on the in-memory store.

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tablebook_core::slot::{SlotError, Venue};
use tablebook_core::table::{DiningTable, TableId};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is present but malformed
    #[error("Invalid {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Opening hours leave no bookable slot
    #[error("Invalid opening hours: {0}")]
    Venue(#[from] SlotError),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// `PostgreSQL` configuration; `None` selects the in-memory store
    pub postgres: Option<PostgresConfig>,
    /// Opening hours, time zone and floor plan
    pub venue: VenueConfig,
    /// Bounds on external calls
    pub timeouts: TimeoutConfig,
    /// Confirmation delivery
    pub notification: NotificationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether `/metrics` is served
    pub metrics_enabled: bool,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl ServerConfig {
    /// Socket address to bind
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `HOST` is not an IP address.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "HOST",
                reason: e.to_string(),
            })
    }
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Run migrations on startup
    pub run_migrations: bool,
}

/// Venue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// First reservation start, venue-local
    pub opening: NaiveTime,
    /// Closing time, venue-local
    pub closing: NaiveTime,
    /// Venue-local offset from UTC in minutes
    pub utc_offset_minutes: i32,
    /// Floor plan seeded into an empty store
    pub tables: Vec<DiningTable>,
}

impl VenueConfig {
    /// Build the slot catalogs for these opening hours
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the offset is out of range or the hours
    /// leave no slot.
    pub fn venue(&self) -> Result<Venue, ConfigError> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid {
                var: "VENUE_UTC_OFFSET_MINUTES",
                reason: format!("{} is out of range", self.utc_offset_minutes),
            }
        })?;
        Ok(Venue::new(offset, self.opening, self.closing)?)
    }
}

/// Timeouts for external calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Store call bound in milliseconds
    pub store_ms: u64,
    /// Notification delivery bound in milliseconds
    pub notification_ms: u64,
}

impl TimeoutConfig {
    /// Store call bound
    #[must_use]
    pub const fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    /// Notification delivery bound
    #[must_use]
    pub const fn notification(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}

/// Confirmation delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Mail relay endpoint; `None` logs confirmations instead
    pub relay_url: Option<String>,
    /// Retries for transient relay failures
    pub max_retries: usize,
}

/// Default floor plan: `id:capacity` pairs
const DEFAULT_TABLES: &str = "1:2,2:2,3:4,4:4,5:4,6:4,7:6,8:6,9:8,10:2";

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a time, offset or table seed is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a time, offset or table seed is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var(&lookup, "PORT").unwrap_or(8080),
                log_level: lookup("RUST_LOG")
                    .unwrap_or_else(|| "tablebook=info,tower_http=debug".to_string()),
                metrics_enabled: parse_var(&lookup, "METRICS_ENABLED").unwrap_or(true),
                shutdown_timeout: parse_var(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(30),
            },
            postgres: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .map(|url| PostgresConfig {
                    url,
                    max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                    run_migrations: parse_var(&lookup, "DATABASE_RUN_MIGRATIONS").unwrap_or(true),
                }),
            venue: VenueConfig {
                opening: match lookup("VENUE_OPENING") {
                    Some(raw) => parse_time("VENUE_OPENING", &raw)?,
                    None => hm(11, 0),
                },
                closing: match lookup("VENUE_CLOSING") {
                    Some(raw) => parse_time("VENUE_CLOSING", &raw)?,
                    None => hm(22, 0),
                },
                utc_offset_minutes: match lookup("VENUE_UTC_OFFSET_MINUTES") {
                    Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                        var: "VENUE_UTC_OFFSET_MINUTES",
                        reason: format!("'{raw}' is not a whole number of minutes"),
                    })?,
                    None => 0,
                },
                tables: parse_tables(
                    lookup("VENUE_TABLES")
                        .as_deref()
                        .unwrap_or(DEFAULT_TABLES),
                )?,
            },
            timeouts: TimeoutConfig {
                store_ms: parse_var(&lookup, "STORE_TIMEOUT_MS").unwrap_or(2_000),
                notification_ms: parse_var(&lookup, "NOTIFICATION_TIMEOUT_MS").unwrap_or(5_000),
            },
            notification: NotificationConfig {
                relay_url: lookup("NOTIFICATION_RELAY_URL").filter(|url| !url.trim().is_empty()),
                max_retries: parse_var(&lookup, "NOTIFICATION_MAX_RETRIES").unwrap_or(2),
            },
        })
    }
}

/// A variable parsed as `T`; absent or malformed values fall back to defaults
fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// `HH:MM`, 24-hour
fn parse_time(var: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("'{raw}' is not an HH:MM time"),
    })
}

/// `id:capacity` pairs separated by commas, e.g. `1:2,2:4`
fn parse_tables(raw: &str) -> Result<Vec<DiningTable>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "VENUE_TABLES",
        reason,
    };

    let mut tables: Vec<DiningTable> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, capacity) = entry
                .split_once(':')
                .ok_or_else(|| invalid(format!("'{entry}' is not id:capacity")))?;
            let id: u32 = id
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{id}' is not a table id")))?;
            let capacity: u32 = capacity
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{capacity}' is not a capacity")))?;
            Ok(DiningTable::new(TableId::new(id), capacity))
        })
        .collect::<Result<_, ConfigError>>()?;

    tables.sort_by_key(|table| table.id);
    if tables.windows(2).any(|pair| pair[0].id == pair[1].id) {
        return Err(invalid("duplicate table id".to_string()));
    }
    if tables.is_empty() {
        return Err(invalid("no tables".to_string()));
    }
    Ok(tables)
}
