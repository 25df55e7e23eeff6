pub mod accounts;
pub mod consistency;
pub mod entries;
pub mod health;
pub mod holds;
pub mod transfers;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::error::LedgerError;
use ledger_core::ids::Id;
use serde_json::json;

use crate::error_mapping::ApiError;

pub(crate) const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Path/query params aren't domain errors, so they don't go through
/// `ApiError` — malformed input never reaches the engine.
pub(crate) fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": {"code": "invalid_input", "message": message.into()}})),
    )
        .into_response()
}

pub(crate) fn parse_id(raw: &str) -> Result<Id, Response> {
    raw.parse::<Id>().map_err(|_| bad_request(format!("not a valid id: {raw}")))
}

/// Absent means run non-idempotently; present-but-empty is a conflict
/// (§7), not silently treated the same as absent.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, Response> {
    match headers.get(IDEMPOTENCY_HEADER) {
        None => Ok(None),
        Some(value) => match value.to_str() {
            Ok(s) if !s.is_empty() => Ok(Some(s.to_string())),
            _ => Err(ApiError::from(LedgerError::EmptyIdempotencyKey).into_response()),
        },
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}
