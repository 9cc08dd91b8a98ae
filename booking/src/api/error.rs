//! Error responses for the booking API.
//!
//! Every handler returns `Result<_, AppError>`. [`BookingError`] converts
//! into an `AppError` with a stable code, so clients branch on `code` and
//! show `fields` next to the offending inputs.

use crate::error::BookingError;
use crate::validation::ValidationErrors;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Per-field problems, for validation failures
    fields: Option<ValidationErrors>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            fields: None,
        }
    }

    /// Attach per-field problems.
    #[must_use]
    pub fn with_fields(mut self, fields: ValidationErrors) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        let status = match &error {
            BookingError::Validation(_)
            | BookingError::SelectionLimitExceeded { .. }
            | BookingError::NoTableSelected => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::SlotUnavailable { .. } | BookingError::ReservationCancelled(_) => {
                StatusCode::CONFLICT
            },
            BookingError::InvalidSlot(_) => StatusCode::BAD_REQUEST,
            BookingError::ReservationNotFound(_) => StatusCode::NOT_FOUND,
            BookingError::StoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let app_error = Self::new(status, error.to_string(), error.code());
        match error {
            BookingError::Validation(fields) => app_error.with_fields(fields),
            _ => app_error,
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Field-level validation problems.
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<ValidationErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            fields: self.fields,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::field;
    use tablebook_core::store::StoreError;
    use tablebook_core::table::TableId;

    #[test]
    fn booking_errors_map_to_statuses() {
        let cases = [
            (
                BookingError::Validation(ValidationErrors::single(field::EMAIL, "is invalid")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (BookingError::selection_limit(), StatusCode::UNPROCESSABLE_ENTITY),
            (
                BookingError::SlotUnavailable {
                    tables: vec![TableId::new(5)],
                },
                StatusCode::CONFLICT,
            ),
            (BookingError::InvalidSlot("x".to_string()), StatusCode::BAD_REQUEST),
            (
                BookingError::StoreFailure(StoreError::Timeout(10)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            let code = error.code();
            let app_error = AppError::from(error);
            assert_eq!(app_error.status(), status);
            assert_eq!(app_error.code(), code);
        }
    }

    #[test]
    fn only_validation_carries_fields() {
        let with_fields = AppError::from(BookingError::Validation(ValidationErrors::single(
            field::PHONE,
            "is required",
        )));
        assert!(with_fields.fields.is_some());

        let without = AppError::from(BookingError::NoTableSelected);
        assert!(without.fields.is_none());
    }
}
