pub mod handlers;
pub mod rules;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::{self, Db};
use crate::error::ApiError;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS risk_rules (
    id         TEXT PRIMARY KEY,
    type       TEXT NOT NULL,
    name       TEXT UNIQUE NOT NULL,
    parameters TEXT NOT NULL,
    action     TEXT NOT NULL,
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS risk_events (
    id             TEXT PRIMARY KEY,
    transaction_id TEXT NOT NULL,
    user_id        TEXT NOT NULL,
    rule_id        TEXT,
    rule_type      TEXT,
    score          INTEGER NOT NULL,
    action         TEXT NOT NULL,
    reason         TEXT,
    amount         INTEGER NOT NULL,
    currency       TEXT NOT NULL,
    metadata       TEXT,
    created_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_risk_events_user ON risk_events(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_risk_events_txn ON risk_events(transaction_id);
";

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("rule not found")]
    RuleNotFound,
    #[error("rule name '{0}' already exists")]
    DuplicateName(String),
    #[error("bad rule parameters: {0}")]
    BadParameters(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl From<RiskError> for ApiError {
    fn from(err: RiskError) -> Self {
        match err {
            RiskError::RuleNotFound => ApiError::not_found(err.to_string()),
            RiskError::DuplicateName(_) => ApiError::conflict(err.to_string()),
            RiskError::BadParameters(_) => ApiError::validation(err.to_string()),
            RiskError::Db(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct RiskState {
    pub db: Db,
}

pub fn router(state: RiskState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/risk/evaluate", post(handlers::evaluate))
        .route(
            "/api/v1/risk/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route(
            "/api/v1/risk/rules/{id}",
            get(handlers::get_rule)
                .patch(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
        .route("/api/v1/risk/events", get(handlers::list_events))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    crate::serve::run("risk", cfg.port, router(RiskState { db })).await
}
