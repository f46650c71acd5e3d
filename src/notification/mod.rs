pub mod handlers;
pub mod queue;
pub mod template;
pub mod worker;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::{self, Db};
use crate::error::ApiError;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notifications (
    id             TEXT PRIMARY KEY,
    user_id        TEXT,
    channel        TEXT NOT NULL,
    type           TEXT NOT NULL,
    priority       TEXT NOT NULL DEFAULT 'normal',
    recipient      TEXT NOT NULL,
    subject        TEXT,
    body           TEXT NOT NULL,
    template_id    TEXT,
    status         TEXT NOT NULL DEFAULT 'queued',
    correlation_id TEXT UNIQUE,
    source_service TEXT,
    metadata       TEXT,
    retry_count    INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    queued_at      INTEGER NOT NULL,
    sent_at        INTEGER,
    delivered_at   INTEGER,
    failed_at      INTEGER,
    created_at     INTEGER NOT NULL,
    updated_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_queue
    ON notifications(status, priority, queued_at);

CREATE TABLE IF NOT EXISTS notification_templates (
    id         TEXT PRIMARY KEY,
    name       TEXT UNIQUE NOT NULL,
    channel    TEXT NOT NULL,
    subject    TEXT,
    body       TEXT NOT NULL,
    version    INTEGER NOT NULL DEFAULT 1,
    metadata   TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found")]
    NotFound,
    #[error("template not found")]
    TemplateNotFound,
    #[error("template name '{0}' already exists")]
    DuplicateName(String),
    #[error("either body or template_id is required")]
    MissingBody,
    #[error("only delivered or failed notifications can be replayed")]
    NotReplayable,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound | NotificationError::TemplateNotFound => {
                ApiError::not_found(err.to_string())
            }
            NotificationError::DuplicateName(_) | NotificationError::NotReplayable => {
                ApiError::conflict(err.to_string())
            }
            NotificationError::MissingBody => ApiError::validation(err.to_string()),
            NotificationError::Db(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct NotificationState {
    pub db: Db,
}

pub fn router(state: NotificationState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/notifications",
            get(handlers::list_notifications).post(handlers::send_notification),
        )
        .route("/api/v1/notifications/stats", get(handlers::get_stats))
        .route(
            "/api/v1/notifications/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/v1/notifications/templates/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route(
            "/api/v1/notifications/templates/{id}/preview",
            post(handlers::preview_template),
        )
        .route("/api/v1/notifications/{id}", get(handlers::get_notification))
        .route(
            "/api/v1/notifications/{id}/replay",
            post(handlers::replay_notification),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    let state = NotificationState { db: db.clone() };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = worker::spawn(db, cfg.sim.clone(), shutdown_rx);

    let result = crate::serve::run("notifications", cfg.port, router(state)).await;

    let _ = shutdown_tx.send(true);
    let _ = worker.await;
    result
}
