use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::ApiError;

use super::NotificationState;
use super::queue::{
    self, Channel, Notification, NotificationFilter, NotificationStatus,
    SendNotificationRequest, Stats,
};
use super::template::{self, CreateTemplateRequest, Template, UpdateTemplateRequest};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "notifications" }))
}

pub async fn send_notification(
    State(state): State<NotificationState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<Notification>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(queue::send(&conn, &req)?))
}

pub async fn get_notification(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(queue::get(&conn, &id)?))
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<String>,
    channel: Option<String>,
    user_id: Option<String>,
    limit: Option<u32>,
}

pub async fn list_notifications(
    State(state): State<NotificationState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let status = match q.status.as_deref() {
        None => None,
        Some(s) => Some(
            NotificationStatus::parse(s)
                .ok_or_else(|| ApiError::validation(format!("invalid status filter: '{s}'")))?,
        ),
    };
    let channel = match q.channel.as_deref() {
        None => None,
        Some(c) => Some(
            Channel::parse(c)
                .ok_or_else(|| ApiError::validation(format!("invalid channel filter: '{c}'")))?,
        ),
    };

    let filter = NotificationFilter {
        status,
        channel,
        user_id: q.user_id,
        limit: q.limit.unwrap_or(0),
    };
    let conn = state.db.lock().await;
    Ok(Json(queue::list(&conn, &filter)?))
}

pub async fn get_stats(State(state): State<NotificationState>) -> Result<Json<Stats>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(queue::stats(&conn)?))
}

pub async fn replay_notification(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(queue::replay(&conn, &id)?))
}

// ── Templates ───────────────────────────────────────────────────────

pub async fn create_template(
    State(state): State<NotificationState>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<Json<Template>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(template::create_template(&conn, &req)?))
}

pub async fn get_template(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(template::get_template(&conn, &id)?))
}

pub async fn list_templates(
    State(state): State<NotificationState>,
) -> Result<Json<Vec<Template>>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(template::list_templates(&conn)?))
}

pub async fn update_template(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<Template>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(template::update_template(&conn, &id, &req)?))
}

pub async fn delete_template(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    template::delete_template(&conn, &id)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub variables: Map<String, Value>,
}

pub async fn preview_template(
    State(state): State<NotificationState>,
    Path(id): Path<String>,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<Value>, ApiError> {
    let conn = state.db.lock().await;
    let tpl = template::get_template(&conn, &id)?;
    Ok(Json(json!({
        "subject": tpl.subject.map(|s| template::render(&s, &req.variables)),
        "body": template::render(&tpl.body, &req.variables),
    })))
}
