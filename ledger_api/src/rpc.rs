//! The RPC adapter: a single `POST /rpc` endpoint that dispatches on a
//! `method` string to the same engine calls the HTTP routes use. Exists for
//! callers that prefer one endpoint and a JSON envelope over a REST surface
//! (internal service-to-service callers, mostly).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use ledger_core::engine::{ActorContext, TransferInput};
use ledger_core::error::LedgerError;
use ledger_core::ids::Id;
use ledger_core::money::Money;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error_mapping::rpc_error_body;
use crate::state::{run_mutation, AppState};

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

pub async fn dispatch(State(state): State<AppState>, Json(req): Json<RpcRequest>) -> Response {
    match handle(&state, req).await {
        Ok(result) => Json(json!({ "result": result })).into_response(),
        Err(err) => (status_for(&err), Json(rpc_error_body(&err))).into_response(),
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    use ledger_core::error::ErrorKind::*;
    match err.kind() {
        NotFound => StatusCode::NOT_FOUND,
        InvalidInput => StatusCode::BAD_REQUEST,
        PreconditionFailed | IdempotencyConflict => StatusCode::CONFLICT,
        Transient => StatusCode::SERVICE_UNAVAILABLE,
        DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn parse_id(raw: &str) -> Result<Id, LedgerError> {
    Id::from_str(raw).map_err(|_| LedgerError::InvalidAmount)
}

fn default_true() -> bool {
    true
}

fn default_limit() -> i64 {
    50
}

async fn handle(state: &AppState, req: RpcRequest) -> Result<Value, LedgerError> {
    let ctx = ActorContext::system();
    let params = req.params;
    let fp_body = json!({ "method": req.method, "params": params });

    match req.method.as_str() {
        "accounts.create" => {
            #[derive(Deserialize)]
            struct P {
                name: String,
                currency: String,
                #[serde(default)]
                allow_negative: bool,
                #[serde(default = "default_true")]
                allow_positive: bool,
            }
            let p: P = parse_params(params)?;
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let account = state
                    .app
                    .engine
                    .create_account(p.name, p.currency, p.allow_negative, p.allow_positive, &ctx)
                    .await?;
                Ok(serde_json::to_value(&account).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "accounts.get" => {
            #[derive(Deserialize)]
            struct P {
                id: String,
            }
            let p: P = parse_params(params)?;
            let account = state.app.engine.get_account(parse_id(&p.id)?).await?;
            Ok(serde_json::to_value(&account).unwrap_or(Value::Null))
        }
        "accounts.list" => {
            #[derive(Deserialize)]
            struct P {
                #[serde(default = "default_limit")]
                limit: i64,
                #[serde(default)]
                offset: i64,
            }
            let p: P = parse_params(params)?;
            let accounts = state.app.engine.list_accounts(p.limit, p.offset).await?;
            Ok(json!({ "accounts": accounts }))
        }
        "transfers.create" => {
            #[derive(Deserialize)]
            struct P {
                from_account_id: String,
                to_account_id: String,
                amount: Money,
                event_at: Option<DateTime<Utc>>,
                #[serde(default)]
                metadata: HashMap<String, Value>,
            }
            let p: P = parse_params(params)?;
            let input = TransferInput {
                from: parse_id(&p.from_account_id)?,
                to: parse_id(&p.to_account_id)?,
                amount: p.amount,
                event_at: p.event_at,
                metadata: p.metadata,
            };
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let transfer = state.app.engine.create_transfer(input, &ctx).await?;
                Ok(serde_json::to_value(&transfer).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "transfers.get" => {
            #[derive(Deserialize)]
            struct P {
                id: String,
            }
            let p: P = parse_params(params)?;
            let transfer = state.app.engine.get_transfer(parse_id(&p.id)?).await?;
            Ok(serde_json::to_value(&transfer).unwrap_or(Value::Null))
        }
        "transfers.listByAccount" => {
            #[derive(Deserialize)]
            struct P {
                account_id: String,
                #[serde(default = "default_limit")]
                limit: i64,
                #[serde(default)]
                offset: i64,
            }
            let p: P = parse_params(params)?;
            let transfers = state
                .app
                .engine
                .list_transfers_by_account(parse_id(&p.account_id)?, p.limit, p.offset)
                .await?;
            Ok(json!({ "transfers": transfers }))
        }
        "transfers.reverse" => {
            #[derive(Deserialize)]
            struct P {
                transfer_id: String,
                #[serde(default)]
                metadata: HashMap<String, Value>,
            }
            let p: P = parse_params(params)?;
            let transfer_id = parse_id(&p.transfer_id)?;
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let reversal = state.app.engine.reverse_transfer(transfer_id, p.metadata, &ctx).await?;
                Ok(serde_json::to_value(&reversal).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "holds.create" => {
            #[derive(Deserialize)]
            struct P {
                account_id: String,
                amount: Money,
                expires_at: Option<DateTime<Utc>>,
                #[serde(default)]
                metadata: HashMap<String, Value>,
            }
            let p: P = parse_params(params)?;
            let account_id = parse_id(&p.account_id)?;
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let hold = state
                    .app
                    .engine
                    .create_hold(account_id, p.amount, p.expires_at, p.metadata, &ctx)
                    .await?;
                Ok(serde_json::to_value(&hold).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "holds.get" => {
            #[derive(Deserialize)]
            struct P {
                id: String,
            }
            let p: P = parse_params(params)?;
            let hold = state.app.engine.get_hold(parse_id(&p.id)?).await?;
            Ok(serde_json::to_value(&hold).unwrap_or(Value::Null))
        }
        "holds.listByAccount" => {
            #[derive(Deserialize)]
            struct P {
                account_id: String,
                #[serde(default = "default_limit")]
                limit: i64,
                #[serde(default)]
                offset: i64,
            }
            let p: P = parse_params(params)?;
            let holds = state
                .app
                .engine
                .list_holds_by_account(parse_id(&p.account_id)?, p.limit, p.offset)
                .await?;
            Ok(json!({ "holds": holds }))
        }
        "holds.void" => {
            #[derive(Deserialize)]
            struct P {
                id: String,
            }
            let p: P = parse_params(params)?;
            let id = parse_id(&p.id)?;
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let hold = state.app.engine.void_hold(id, &ctx).await?;
                Ok(serde_json::to_value(&hold).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "holds.capture" => {
            #[derive(Deserialize)]
            struct P {
                id: String,
                to_account_id: String,
            }
            let p: P = parse_params(params)?;
            let id = parse_id(&p.id)?;
            let to_account_id = parse_id(&p.to_account_id)?;
            let (_, value) = run_mutation(state, req.method.as_str(), req.idempotency_key, &fp_body, || async {
                let transfer = state.app.engine.capture_hold(id, to_account_id, &ctx).await?;
                Ok(serde_json::to_value(&transfer).unwrap_or(Value::Null))
            })
            .await?;
            Ok(value)
        }
        "entries.listByAccount" => {
            #[derive(Deserialize)]
            struct P {
                account_id: String,
                #[serde(default = "default_limit")]
                limit: i64,
                #[serde(default)]
                offset: i64,
            }
            let p: P = parse_params(params)?;
            let entries = state
                .app
                .engine
                .get_entries_by_account(parse_id(&p.account_id)?, p.limit, p.offset)
                .await?;
            Ok(json!({ "entries": entries }))
        }
        "entries.listByTransfer" => {
            #[derive(Deserialize)]
            struct P {
                transfer_id: String,
            }
            let p: P = parse_params(params)?;
            let entries = state.app.engine.get_entries_by_transfer(parse_id(&p.transfer_id)?).await?;
            Ok(json!({ "entries": entries }))
        }
        "entries.balanceAt" => {
            #[derive(Deserialize)]
            struct P {
                account_id: String,
                at: DateTime<Utc>,
            }
            let p: P = parse_params(params)?;
            let balance = state.app.engine.get_balance_at(parse_id(&p.account_id)?, p.at).await?;
            Ok(json!({ "balance": balance }))
        }
        "consistency.check" => {
            ledger_core::consistency::check_consistency(state.app.engine.store().as_ref()).await?;
            Ok(json!({ "consistent": true }))
        }
        other => Err(LedgerError::Internal(anyhow::anyhow!("unknown rpc method: {other}"))),
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, LedgerError> {
    serde_json::from_value(params).map_err(|e| LedgerError::Internal(anyhow::anyhow!("bad rpc params: {e}")))
}
