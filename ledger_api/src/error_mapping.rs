//! Maps the core's [`LedgerError`] onto transport shapes. No ledger
//! invariant lives here — this only translates an already-decided error
//! into a status code and a body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::error::{ErrorKind, LedgerError};
use serde_json::json;

pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        let body = Json(json!({
            "error": {
                "code": code_for(self.0.kind()),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::PreconditionFailed => StatusCode::CONFLICT,
        ErrorKind::IdempotencyConflict => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::InvalidInput => "invalid_input",
        ErrorKind::PreconditionFailed => "precondition_failed",
        ErrorKind::IdempotencyConflict => "idempotency_conflict",
        ErrorKind::Transient => "transient",
        ErrorKind::DeadlineExceeded => "deadline_exceeded",
        ErrorKind::Internal => "internal",
    }
}

/// The RPC adapter's error envelope: `{"error": {"code", "message"}}`, the
/// same taxonomy as the HTTP mapping but without a status line to drive.
pub fn rpc_error_body(err: &LedgerError) -> serde_json::Value {
    json!({
        "error": {
            "code": code_for(err.kind()),
            "message": err.to_string(),
        }
    })
}
