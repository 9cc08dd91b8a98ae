//! Health check endpoints for the booking service.
//!
//! `/health` probes the reservation store and reports every component with
//! the aggregate status. It answers 503 only when something is unhealthy,
//! so a slow but working store keeps the instance in rotation.

use super::state::AppState;
use crate::bounded::store_call;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::time::Instant;
use tablebook_runtime::{HealthCheck, HealthReport, HealthStatus};

/// Latency above which the store is reported as degraded
const SLOW_STORE_MS: u128 = 500;

/// One component in the health response.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component name
    pub component: String,
    /// `healthy`, `degraded` or `unhealthy`
    pub status: String,
    /// Details when not healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra key/value facts
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<(String, String)>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Worst component status
    pub status: String,
    /// Service version
    pub version: String,
    /// When the report was taken
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Per-component results
    pub checks: Vec<ComponentHealth>,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: report.status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: report.timestamp,
            checks: report
                .checks
                .into_iter()
                .map(|check| ComponentHealth {
                    component: check.component,
                    status: check.status.to_string(),
                    message: check.message,
                    metadata: check.metadata,
                })
                .collect(),
        }
    }
}

/// Probe the reservation store with a table listing.
async fn store_check(state: &AppState) -> HealthCheck {
    let start = Instant::now();
    match store_call("health_check", state.store_timeout, state.store.list_tables()).await {
        Ok(tables) => {
            let elapsed = start.elapsed().as_millis();
            let check = if elapsed > SLOW_STORE_MS {
                HealthCheck::degraded("reservation_store", format!("slow response: {elapsed}ms"))
            } else {
                HealthCheck::healthy("reservation_store")
            };
            check
                .with_metadata("tables", tables.len().to_string())
                .with_metadata("latency_ms", elapsed.to_string())
        },
        Err(error) => HealthCheck::unhealthy("reservation_store", error.to_string()),
    }
}

/// Health check endpoint.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","timestamp":"...","checks":[...]}
/// ```
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = HealthReport::new(vec![store_check(&state).await]);

    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(report.into()))
}

/// Prometheus scrape endpoint.
///
/// 404 when this process did not install the recorder.
pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics.as_deref().and_then(|metrics| metrics.render()) {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
