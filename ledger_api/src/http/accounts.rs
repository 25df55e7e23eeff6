use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::engine::ActorContext;
use ledger_core::model::Account;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_mapping::ApiError;
use crate::state::{run_mutation, AppState};

use super::{idempotency_key, parse_id, Pagination};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default = "default_true")]
    pub allow_positive: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Response, Response> {
    let key = idempotency_key(&headers)?;
    let body = serde_json::to_value(&req).unwrap_or(serde_json::Value::Null);
    let ctx = ActorContext::system();

    let (fresh, value) = run_mutation(&state, "accounts.create", key, &body, || async {
        let account = state
            .app
            .engine
            .create_account(req.name, req.currency, req.allow_negative, req.allow_positive, &ctx)
            .await?;
        Ok(serde_json::to_value(&account).unwrap_or(serde_json::Value::Null))
    })
    .await
    .map_err(|e| ApiError::from(e).into_response())?;

    let status = if fresh { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(value)).into_response())
}

pub async fn get(State(state): State<AppState>, Path(raw_id): Path<String>) -> Result<Response, Response> {
    let id = parse_id(&raw_id)?;
    let account: Account = state.app.engine.get_account(id).await.map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(account).into_response())
}

pub async fn list(State(state): State<AppState>, Query(page): Query<Pagination>) -> Result<Response, Response> {
    let accounts = state
        .app
        .engine
        .list_accounts(page.limit, page.offset)
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "accounts": accounts })).into_response())
}
