use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;

use super::accounts::{
    self, Account, AccountFilter, AccountStatus, AccountType, CreateAccountRequest,
    UpdateAccountRequest,
};
use super::entries::{self, CreateEntryRequest, EntryFilter, EntryStatus, JournalEntry};
use super::LedgerState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "ledger" }))
}

pub async fn create_account(
    State(state): State<LedgerState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(accounts::create_account(&conn, &req)?))
}

pub async fn get_account(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(accounts::get_account(&conn, &id)?))
}

pub async fn get_account_by_code(
    State(state): State<LedgerState>,
    Path(code): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(accounts::get_account_by_code(&conn, &code)?))
}

#[derive(Deserialize)]
pub struct ListAccountsQuery {
    #[serde(rename = "type")]
    account_type: Option<String>,
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn list_accounts(
    State(state): State<LedgerState>,
    Query(q): Query<ListAccountsQuery>,
) -> Result<Json<Vec<Account>>, ApiError> {
    let filter = AccountFilter {
        account_type: parse_filter(q.account_type.as_deref(), AccountType::parse, "type")?,
        status: parse_filter(q.status.as_deref(), AccountStatus::parse, "status")?,
        limit: q.limit.unwrap_or(0),
        offset: q.offset.unwrap_or(0),
    };
    let conn = state.db.lock().await;
    Ok(Json(accounts::list_accounts(&conn, &filter)?))
}

pub async fn update_account(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(accounts::update_account(&conn, &id, &req)?))
}

pub async fn create_entry(
    State(state): State<LedgerState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<Json<JournalEntry>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(entries::create_entry(&mut conn, &req)?))
}

pub async fn get_entry(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
) -> Result<Json<JournalEntry>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(entries::get_entry(&conn, &id)?))
}

#[derive(Deserialize)]
pub struct ListEntriesQuery {
    status: Option<String>,
    reference_id: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn list_entries(
    State(state): State<LedgerState>,
    Query(q): Query<ListEntriesQuery>,
) -> Result<Json<Vec<JournalEntry>>, ApiError> {
    let filter = EntryFilter {
        status: parse_filter(q.status.as_deref(), EntryStatus::parse, "status")?,
        reference_id: q.reference_id,
        limit: q.limit.unwrap_or(0),
        offset: q.offset.unwrap_or(0),
    };
    let conn = state.db.lock().await;
    Ok(Json(entries::list_entries(&conn, &filter)?))
}

#[derive(Deserialize)]
pub struct PostEntryRequest {
    pub posted_by: String,
}

pub async fn post_entry(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
    Json(req): Json<PostEntryRequest>,
) -> Result<Json<JournalEntry>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(entries::post_entry(&mut conn, &id, &req.posted_by)?))
}

#[derive(Deserialize)]
pub struct VoidEntryRequest {
    pub voided_by: String,
    pub reason: String,
}

pub async fn void_entry(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
    Json(req): Json<VoidEntryRequest>,
) -> Result<Json<JournalEntry>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(entries::void_entry(
        &mut conn,
        &id,
        &req.voided_by,
        &req.reason,
    )?))
}

#[derive(Deserialize)]
pub struct ReverseEntryRequest {
    pub reversed_by: String,
    pub reason: Option<String>,
}

pub async fn reverse_entry(
    State(state): State<LedgerState>,
    Path(id): Path<String>,
    Json(req): Json<ReverseEntryRequest>,
) -> Result<Json<JournalEntry>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(entries::reverse_entry(
        &mut conn,
        &id,
        &req.reversed_by,
        req.reason.as_deref(),
    )?))
}

fn parse_filter<T>(
    raw: Option<&str>,
    parse: fn(&str) -> Option<T>,
    field: &str,
) -> Result<Option<T>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("invalid {field} filter: '{s}'"))),
    }
}
