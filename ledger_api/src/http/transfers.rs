use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use ledger_core::engine::{ActorContext, BatchTransferInput, TransferInput};
use ledger_core::money::Money;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_mapping::ApiError;
use crate::state::{run_mutation, AppState};

use super::{idempotency_key, parse_id, Pagination};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: Money,
    pub event_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CreateTransferRequest {
    fn into_input(self) -> Result<TransferInput, Response> {
        let from = parse_id(&self.from_account_id)?;
        let to = parse_id(&self.to_account_id)?;
        Ok(TransferInput {
            from,
            to,
            amount: self.amount,
            event_at: self.event_at,
            metadata: self.metadata,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTransferRequest>,
) -> Result<Response, Response> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    let ctx = ActorContext::system();
    let input = req.into_input()?;

    let (fresh, value) = run_mutation(&state, "transfers.create", key, &body, || async {
        let transfer = state.app.engine.create_transfer(input, &ctx).await?;
        Ok(serde_json::to_value(&transfer).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(value)).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBatchTransferRequest {
    pub transfers: Vec<CreateTransferRequest>,
}

pub async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBatchTransferRequest>,
) -> Result<Response, Response> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    let ctx = ActorContext::system();

    let mut batch: BatchTransferInput = Vec::with_capacity(req.transfers.len());
    for item in req.transfers {
        batch.push(item.into_input()?);
    }

    let (fresh, value) = run_mutation(&state, "transfers.createBatch", key, &body, || async {
        let transfers = state.app.engine.create_batch_transfer(batch, &ctx).await?;
        Ok(serde_json::to_value(&transfers).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "transfers": value }))).into_response())
}

pub async fn get(State(state): State<AppState>, Path(raw_id): Path<String>) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let transfer = state.app.engine.get_transfer(id).await.map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(transfer).into_response())
}

pub async fn list_for_account(
    State(state): State<AppState>,
    Path(raw_account_id): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Response, Response> {
    let account_id = parse_id(&raw_account_id)?;
    let transfers = state
        .app
        .engine
        .list_transfers_by_account(account_id, page.limit, page.offset)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "transfers": transfers })).into_response())
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ReverseTransferRequest {
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

pub async fn reverse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    body: Option<Json<ReverseTransferRequest>>,
) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let key = idempotency_key(&headers)?;
    let fingerprint_body = json!({ "transferId": raw_id, "metadata": req.metadata });
    let ctx = ActorContext::system();

    let (fresh, value) = run_mutation(&state, "transfers.reverse", key, &fingerprint_body, || async {
        let reversal = state.app.engine.reverse_transfer(id, req.metadata, &ctx).await?;
        Ok(serde_json::to_value(&reversal).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(value)).into_response())
}
