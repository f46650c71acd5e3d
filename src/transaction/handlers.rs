use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::UserContext;
use crate::error::ApiError;

use super::TxState;
use super::orchestrator::{DepositApiRequest, TransferApiRequest};
use super::store::{self, Transaction, TransactionFilter, TransactionStatus, TransactionType};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "transactions" }))
}

pub async fn create_transfer(
    ctx: UserContext,
    State(state): State<TxState>,
    Json(req): Json<TransferApiRequest>,
) -> Result<Json<Transaction>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    let txn = state
        .orchestrator
        .create_transfer(&ctx.user_id, &req)
        .await?;
    Ok(Json(txn))
}

pub async fn create_deposit(
    ctx: UserContext,
    State(state): State<TxState>,
    Json(req): Json<DepositApiRequest>,
) -> Result<Json<Transaction>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    let txn = state
        .orchestrator
        .create_deposit(&ctx.user_id, &req)
        .await?;
    Ok(Json(txn))
}

pub async fn create_withdrawal(
    ctx: UserContext,
    State(state): State<TxState>,
    Json(req): Json<DepositApiRequest>,
) -> Result<Json<Transaction>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    let txn = state
        .orchestrator
        .create_withdrawal(&ctx.user_id, &req)
        .await?;
    Ok(Json(txn))
}

pub async fn reverse_transaction(
    ctx: UserContext,
    State(state): State<TxState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let txn = state.orchestrator.reverse(&ctx.user_id, &id).await?;
    Ok(Json(txn))
}

pub async fn cancel_transaction(
    ctx: UserContext,
    State(state): State<TxState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let txn = state.orchestrator.cancel(&ctx.user_id, &id).await?;
    Ok(Json(txn))
}

pub async fn get_transaction(
    ctx: UserContext,
    State(state): State<TxState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let conn = state.db.lock().await;
    let txn = store::get(&conn, &id)?;
    if txn.user_id != ctx.user_id {
        return Err(ApiError::not_found("transaction not found"));
    }
    Ok(Json(txn))
}

#[derive(Deserialize)]
pub struct ListTransactionsQuery {
    status: Option<String>,
    #[serde(rename = "type")]
    transaction_type: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn list_transactions(
    ctx: UserContext,
    State(state): State<TxState>,
    Query(q): Query<ListTransactionsQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let status = match q.status.as_deref() {
        None => None,
        Some(s) => Some(
            TransactionStatus::parse(s)
                .ok_or_else(|| ApiError::validation(format!("invalid status filter: '{s}'")))?,
        ),
    };
    let transaction_type = match q.transaction_type.as_deref() {
        None => None,
        Some(t) => Some(
            TransactionType::parse(t)
                .ok_or_else(|| ApiError::validation(format!("invalid type filter: '{t}'")))?,
        ),
    };

    let filter = TransactionFilter {
        status,
        transaction_type,
        limit: q.limit.unwrap_or(0),
        offset: q.offset.unwrap_or(0),
    };
    let conn = state.db.lock().await;
    Ok(Json(store::list_for_user(&conn, &ctx.user_id, &filter)?))
}
