use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;

use super::RiskState;
use super::rules::{
    self, CreateRuleRequest, EvaluateRequest, EventFilter, RiskEvent, RiskRule, RiskVerdict,
    UpdateRuleRequest,
};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "risk" }))
}

pub async fn evaluate(
    State(state): State<RiskState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<RiskVerdict>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    let mut conn = state.db.lock().await;
    Ok(Json(rules::evaluate(&mut conn, &req)?))
}

pub async fn create_rule(
    State(state): State<RiskState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<RiskRule>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(rules::create_rule(&conn, &req)?))
}

pub async fn get_rule(
    State(state): State<RiskState>,
    Path(id): Path<String>,
) -> Result<Json<RiskRule>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(rules::get_rule(&conn, &id)?))
}

pub async fn list_rules(State(state): State<RiskState>) -> Result<Json<Vec<RiskRule>>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(rules::list_rules(&conn)?))
}

pub async fn update_rule(
    State(state): State<RiskState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRuleRequest>,
) -> Result<Json<RiskRule>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(rules::update_rule(&conn, &id, &req)?))
}

pub async fn delete_rule(
    State(state): State<RiskState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    rules::delete_rule(&conn, &id)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ListEventsQuery {
    transaction_id: Option<String>,
    user_id: Option<String>,
    limit: Option<u32>,
}

pub async fn list_events(
    State(state): State<RiskState>,
    Query(q): Query<ListEventsQuery>,
) -> Result<Json<Vec<RiskEvent>>, ApiError> {
    let filter = EventFilter {
        transaction_id: q.transaction_id,
        user_id: q.user_id,
        limit: q.limit.unwrap_or(0),
    };
    let conn = state.db.lock().await;
    Ok(Json(rules::list_events(&conn, &filter)?))
}
