use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use ledger_core::engine::ActorContext;
use ledger_core::money::Money;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_mapping::ApiError;
use crate::state::{run_mutation, AppState};

use super::{idempotency_key, parse_id, Pagination};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateHoldRequest {
    pub account_id: String,
    pub amount: Money,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateHoldRequest>,
) -> Result<Response, Response> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    let ctx = ActorContext::system();
    let account_id = parse_id(&req.account_id)?;

    let (fresh, value) = run_mutation(&state, "holds.create", key, &body, || async {
        let hold = state
            .app
            .engine
            .create_hold(account_id, req.amount, req.expires_at, req.metadata, &ctx)
            .await?;
        Ok(serde_json::to_value(&hold).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(value)).into_response())
}

pub async fn get(State(state): State<AppState>, Path(raw_id): Path<String>) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let hold = state.app.engine.get_hold(id).await.map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(hold).into_response())
}

pub async fn list_for_account(
    State(state): State<AppState>,
    Path(raw_account_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Response, Response> {
    let account_id = parse_id(&raw_account_id)?;
    let holds = state
        .app
        .engine
        .list_holds_by_account(account_id, page.limit, page.offset)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "holds": holds })).into_response())
}

pub async fn void(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let key = idempotency_key(&headers)?;
    let body = json!({ "holdId": raw_id });
    let ctx = ActorContext::system();

    let (_, value) = run_mutation(&state, "holds.void", key, &body, || async {
        let hold = state.app.engine.void_hold(id, &ctx).await?;
        Ok(serde_json::to_value(&hold).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    Ok(Json(value).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureHoldRequest {
    pub to_account_id: String,
}

pub async fn capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Json(req): Json<CaptureHoldRequest>,
) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let to_account_id = parse_id(&req.to_account_id)?;
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    let ctx = ActorContext::system();

    let (fresh, value) = run_mutation(&state, "holds.capture", key, &body, || async {
        let transfer = state.app.engine.capture_hold(id, to_account_id, &ctx).await?;
        Ok(serde_json::to_value(&transfer).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(value)).into_response())
}
