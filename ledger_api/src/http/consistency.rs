use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ledger_core::consistency::check_consistency;
use serde_json::json;

use crate::error_mapping::ApiError;
use crate::state::AppState;

pub async fn check(State(state): State<AppState>) -> Result<Response, Response> {
    check_consistency(state.app.engine.store().as_ref())
        .await
        .map_err(|e| ApiError::from(e).into_response())?;
    Ok(Json(json!({ "consistent": true })).into_response())
}
