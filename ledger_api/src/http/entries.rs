use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error_mapping::ApiError;
use crate::state::AppState;

use super::{parse_id, Pagination};

pub async fn list_for_account(
    State(state): State<AppState>,
    Path(raw_account_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Response, Response> {
    let account_id = parse_id(&raw_account_id)?;
    let entries = state
        .app
        .engine
        .get_entries_by_account(account_id, page.limit, page.offset)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "entries": entries })).into_response())
}

pub async fn list_for_transfer(State(state): State<AppState>, Path(raw_transfer_id): Path<String>) -> Result<Response, Response> {
    let transfer_id = parse_id(&raw_transfer_id)?;
    let entries = state
        .app
        .engine
        .get_entries_by_transfer(transfer_id)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "entries": entries })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct BalanceAtQuery {
    pub at: DateTime<Utc>,
}

pub async fn balance_at(
    State(state): State<AppState>,
    Path(raw_account_id): Path<String>,
    Query(query): Query<BalanceAtQuery>,
) -> Result<Response, Response> {
    let account_id = parse_id(&raw_account_id)?;
    let balance = state
        .app
        .engine
        .get_balance_at(account_id, query.at)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "accountId": raw_account_id, "at": query.at, "balance": balance })).into_response())
}
