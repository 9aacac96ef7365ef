//! # API Error Type
//!
//! Every failed request answers with the same JSON shape:
//!
//! ```json
//! { "code": "INVALID_TRANSITION", "message": "Ticket 1f0c... cannot move from completed to cancelled" }
//! ```
//!
//! | Code                      | Status |
//! |---------------------------|--------|
//! | `INVALID_CLASS`           | 400    |
//! | `VALIDATION_ERROR`        | 400    |
//! | `NOT_FOUND`               | 404    |
//! | `DUPLICATE_ACTIVE_TICKET` | 409    |
//! | `INVALID_TRANSITION`      | 409    |
//! | `COUNTER_BUSY`            | 409    |
//! | `COUNTER_INACTIVE`        | 409    |
//! | `DATABASE_ERROR`          | 500    |
//!
//! Malformed bodies and query strings are `VALIDATION_ERROR` too. Server-side
//! failures are logged in full and answered with a generic message.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use beacon_core::CoreError;
use beacon_dispatch::{DispatchError, ErrorKind};

/// Error returned from HTTP handlers.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidClass | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateActiveTicket
        | ErrorKind::InvalidTransition
        | ErrorKind::CounterBusy
        | ErrorKind::CounterInactive => StatusCode::CONFLICT,
        ErrorKind::Database | ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let kind = err.kind();
        let status = status_for(kind);

        if status.is_server_error() {
            tracing::error!(code = kind.code(), error = %err, "Request failed");
            return ApiError::new(
                status,
                ErrorKind::Database.code(),
                "Database operation failed",
            );
        }

        ApiError::new(status, kind.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation.code(),
            rejection.body_text(),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation.code(),
            rejection.body_text(),
        )
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        DispatchError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
